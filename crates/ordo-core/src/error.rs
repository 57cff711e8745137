use std::fmt;

/// Machine-readable error codes shared by the optimistic and authoritative
/// layers so both sides report a rejected move the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    ItemNotFound,
    EmptyDrag,
    ScopeMismatch,
    TargetIsDragged,
    TargetNotInSiblingGroup,
    CircularParentRejected,
    AnchorNotInGroup,
    InvertedNeighbors,
    NonFinitePosition,
    PrecisionExhausted,
    ConsistencyMismatch,
    EmptyBatch,
    DuplicateItem,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::ItemNotFound => "E2001",
            Self::EmptyDrag => "E2002",
            Self::ScopeMismatch => "E2003",
            Self::TargetIsDragged => "E2004",
            Self::TargetNotInSiblingGroup => "E2005",
            Self::CircularParentRejected => "E2006",
            Self::AnchorNotInGroup => "E2007",
            Self::InvertedNeighbors => "E3001",
            Self::NonFinitePosition => "E3002",
            Self::PrecisionExhausted => "E3003",
            Self::ConsistencyMismatch => "E4001",
            Self::EmptyBatch => "E5001",
            Self::DuplicateItem => "E5002",
        }
    }

    /// Short human-facing summary for logs.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::ItemNotFound => "Item not found",
            Self::EmptyDrag => "Nothing was dragged",
            Self::ScopeMismatch => "Items belong to different scopes",
            Self::TargetIsDragged => "Drop target is part of the drag",
            Self::TargetNotInSiblingGroup => "Drop target missing from its sibling group",
            Self::CircularParentRejected => "Move would create a cycle",
            Self::AnchorNotInGroup => "Insertion anchor missing from its group",
            Self::InvertedNeighbors => "Neighbor positions are out of order",
            Self::NonFinitePosition => "Position is not a finite number",
            Self::PrecisionExhausted => "No representable position between neighbors",
            Self::ConsistencyMismatch => "Predicted order differs from authoritative order",
            Self::EmptyBatch => "Update batch is empty",
            Self::DuplicateItem => "Item already exists",
        }
    }

    /// Optional remediation hint for the calling layer.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in the ordering config file and retry."),
            Self::ItemNotFound | Self::TargetNotInSiblingGroup | Self::AnchorNotInGroup => {
                Some("Abort the drop and re-fetch a fresh snapshot.")
            }
            Self::EmptyDrag | Self::TargetIsDragged | Self::EmptyBatch => None,
            Self::ScopeMismatch => Some("Move items between scopes through the owning collection."),
            Self::CircularParentRejected => {
                Some("An item cannot be nested under itself or its descendants.")
            }
            Self::InvertedNeighbors | Self::NonFinitePosition => {
                Some("Sort siblings by position before computing neighbors.")
            }
            Self::PrecisionExhausted => Some("Rebalance the sibling group and retry."),
            Self::ConsistencyMismatch => {
                Some("The authoritative order was applied; no action needed.")
            }
            Self::DuplicateItem => Some("Generate a fresh id for the new item."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
