//! Seeded drag-and-drop workload against an optimistic client and an
//! authoritative server.
//!
//! Each step picks a scope and one action:
//!
//! - **move**: the client plans a drop against its own snapshot, which may
//!   lag behind the server. The server reconciles the plan and persists the
//!   authoritative batch.
//! - **create**: the server places a new item at a start, end, or after-sibling
//!   slot chosen from the client's view.
//! - **delete**: the server drops an item together with its subtree.
//!
//! After a step the client re-syncs its snapshot unless the step rolled
//! stale, which is how stale plans reach the server.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result, bail};
use ordo_core::consistency::AuthoritativeMove;
use ordo_core::{
    ConsistencyValidator, InsertionHint, ItemId, MemoryStore, MoveDescriptor,
    OrderableItem, OrderingConfig, PersistenceSink, ReorderCoordinator, ReorderError, ScopeId,
    Snapshot, SnapshotProvider, UpdateBatch, ValidationError, flatten, organize_snapshot,
    reorder::InsertAt,
};
use serde::{Deserialize, Serialize};

use crate::rng::DeterministicRng;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Parameters for one simulated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    /// Independent collections.
    pub scopes: usize,
    /// Items seeded into each scope before the first step.
    pub items_per_scope: usize,
    /// Maximum nesting levels in the seeded forest (1 = roots only).
    pub max_depth: usize,
    /// Steps to run.
    pub moves: usize,
    /// Chance (percent) a move drags more than one item.
    pub multi_drag_percent: u8,
    /// Chance (percent) the client skips its post-step sync.
    pub stale_percent: u8,
    /// Chance (percent) a pointer lands in the nest band.
    pub nest_percent: u8,
    /// Chance (percent) a move drops onto the previous drop's target again,
    /// above it, to wear down one gap.
    pub hotspot_percent: u8,
    /// Chance (percent) a step creates an item.
    pub create_percent: u8,
    /// Chance (percent) a step deletes a subtree.
    pub delete_percent: u8,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            scopes: 2,
            items_per_scope: 24,
            max_depth: 4,
            moves: 64,
            multi_drag_percent: 20,
            stale_percent: 15,
            nest_percent: 30,
            hotspot_percent: 10,
            create_percent: 10,
            delete_percent: 5,
        }
    }
}

impl SimulationConfig {
    /// # Errors
    ///
    /// Returns an error if any parameter is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.scopes == 0 {
            bail!("scopes must be > 0");
        }
        if self.items_per_scope == 0 {
            bail!("items_per_scope must be > 0");
        }
        if self.max_depth == 0 {
            bail!("max_depth must be > 0");
        }
        if self.moves == 0 {
            bail!("moves must be > 0");
        }
        let percents = [
            ("multi_drag_percent", self.multi_drag_percent),
            ("stale_percent", self.stale_percent),
            ("nest_percent", self.nest_percent),
            ("hotspot_percent", self.hotspot_percent),
            ("create_percent", self.create_percent),
            ("delete_percent", self.delete_percent),
        ];
        for (name, value) in percents {
            if value > 100 {
                bail!("{name} must be <= 100, got {value}");
            }
        }
        if u16::from(self.create_percent) + u16::from(self.delete_percent) > 100 {
            bail!("create_percent + delete_percent must be <= 100");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Trace
// ---------------------------------------------------------------------------

/// How a move ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MoveOutcome {
    Applied {
        rebalanced: bool,
        matched: bool,
        updates: usize,
    },
    /// The client refused to plan the drop.
    ClientRejected {
        code: String,
        /// For cycle rejections: whether the server refuses the same parent.
        server_rejects: Option<bool>,
    },
    /// The client planned it but the server refused it.
    ServerRejected { code: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Move {
        dragged: Vec<ItemId>,
        target: ItemId,
        ratio: f64,
        outcome: MoveOutcome,
    },
    Create {
        id: ItemId,
        parent: Option<ItemId>,
        accepted: bool,
    },
    Delete {
        id: ItemId,
        removed: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: usize,
    pub scope: ScopeId,
    /// The client's snapshot equaled the server's when the step started.
    pub fresh: bool,
    pub action: Action,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimStats {
    pub moves_applied: usize,
    pub client_rejections: usize,
    pub server_rejections: usize,
    pub mismatches: usize,
    pub rebalances: usize,
    pub creates: usize,
    pub deletes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub seed: u64,
    pub trace: Vec<StepRecord>,
    /// Server items at the end, depth-first.
    pub items: Vec<OrderableItem>,
    pub stats: SimStats,
    /// A rebalance, a mismatch, or a server rejection happened.
    pub interesting_state_reached: bool,
}

impl SimulationResult {
    #[must_use]
    pub fn final_snapshot(&self) -> Snapshot {
        Snapshot::new(self.items.iter().cloned())
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

pub struct Simulator {
    config: SimulationConfig,
    rng: DeterministicRng,
    client_rng: DeterministicRng,
    server_rng: DeterministicRng,
    coordinator: ReorderCoordinator,
    validator: ConsistencyValidator,
    store: MemoryStore,
    scopes: Vec<ScopeId>,
    clients: BTreeMap<ScopeId, Snapshot>,
    hotspot: Option<(ScopeId, ItemId)>,
    next_id: u64,
    stats: SimStats,
}

impl Simulator {
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        Self::with_ordering(config, &OrderingConfig::default())
    }

    /// Same as [`new`](Self::new) with explicit engine settings.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn with_ordering(config: SimulationConfig, ordering: &OrderingConfig) -> Result<Self> {
        config.validate()?;
        let seed = config.seed;
        let scopes = (0..config.scopes)
            .map(|k| ScopeId::new(format!("scope-{k}")))
            .collect();
        Ok(Self {
            rng: DeterministicRng::new(seed),
            client_rng: DeterministicRng::fork(seed, 1),
            server_rng: DeterministicRng::fork(seed, 2),
            coordinator: ReorderCoordinator::new(ordering),
            validator: ConsistencyValidator::new(ordering.consistency),
            store: MemoryStore::default(),
            scopes,
            clients: BTreeMap::new(),
            hotspot: None,
            next_id: 0,
            stats: SimStats::default(),
            config,
        })
    }

    /// Seed the forests and run every step.
    ///
    /// # Errors
    ///
    /// Returns an error if the store refuses a batch the engine produced,
    /// which means the engine and the store disagree about the state.
    pub fn run(&mut self) -> Result<SimulationResult> {
        self.seed_forests()?;

        let mut trace = Vec::with_capacity(self.config.moves);
        for step in 0..self.config.moves {
            trace.push(self.step(step)?);
        }

        let stats = self.stats;
        tracing::debug!(seed = self.config.seed, ?stats, "simulation finished");
        Ok(SimulationResult {
            seed: self.config.seed,
            trace,
            items: flatten(&organize_snapshot(self.store.all())),
            stats,
            interesting_state_reached: stats.rebalances > 0
                || stats.mismatches > 0
                || stats.server_rejections > 0,
        })
    }

    fn fresh_id(&mut self, scope: &ScopeId) -> ItemId {
        self.next_id += 1;
        ItemId::new(format!("{scope}-{:04}", self.next_id))
    }

    fn seed_forests(&mut self) -> Result<()> {
        for scope in self.scopes.clone() {
            let mut depth: BTreeMap<ItemId, usize> = BTreeMap::new();
            for _ in 0..self.config.items_per_scope {
                let candidates: Vec<&ItemId> = depth
                    .iter()
                    .filter(|(_, d)| **d + 1 < self.config.max_depth)
                    .map(|(id, _)| id)
                    .collect();
                let parent = if !candidates.is_empty() && self.rng.hit_rate_percent(60) {
                    Some(candidates[self.rng.next_index(candidates.len())].clone())
                } else {
                    None
                };

                let id = self.fresh_id(&scope);
                let snapshot = self.store.snapshot(&scope);
                let placement = self
                    .coordinator
                    .place_new(
                        &snapshot,
                        id.clone(),
                        &scope,
                        parent.as_ref(),
                        &InsertAt::End,
                        &mut self.server_rng,
                    )
                    .with_context(|| format!("place seed item {id}"))?;
                self.store
                    .create(&placement)
                    .with_context(|| format!("store seed item {id}"))?;

                let level = parent.as_ref().and_then(|p| depth.get(p)).map_or(0, |d| d + 1);
                depth.insert(id, level);
            }
            self.clients.insert(scope.clone(), self.store.snapshot(&scope));
        }
        Ok(())
    }

    fn step(&mut self, step: usize) -> Result<StepRecord> {
        let scope = self.scopes[self.rng.next_index(self.scopes.len())].clone();
        let server = self.store.snapshot(&scope);
        let client = self.clients.get(&scope).cloned().unwrap_or_default();
        let fresh = client == server;

        let roll = self.rng.next_bounded(100);
        let create_cut = u64::from(self.config.create_percent);
        let delete_cut = create_cut + u64::from(self.config.delete_percent);

        let action = if client.is_empty() || server.is_empty() || roll < create_cut {
            self.create(&scope, &client)?
        } else if roll < delete_cut {
            self.delete(&server)
        } else {
            self.drag(&scope, &client, &server)?
        };

        if !self.rng.hit_rate_percent(self.config.stale_percent) {
            self.clients.insert(scope.clone(), self.store.snapshot(&scope));
        }

        Ok(StepRecord {
            step,
            scope,
            fresh,
            action,
        })
    }

    fn pick_item<'a>(&mut self, snapshot: &'a Snapshot) -> Option<&'a OrderableItem> {
        let items: Vec<&OrderableItem> = snapshot.iter().collect();
        if items.is_empty() {
            return None;
        }
        Some(items[self.rng.next_index(items.len())])
    }

    fn drag(&mut self, scope: &ScopeId, client: &Snapshot, server: &Snapshot) -> Result<Action> {
        let count = if self.rng.hit_rate_percent(self.config.multi_drag_percent) {
            2 + self.rng.next_index(2)
        } else {
            1
        };
        let mut dragged = Vec::with_capacity(count);
        for _ in 0..count {
            if let Some(item) = self.pick_item(client) {
                dragged.push(item.id.clone());
            }
        }

        let hotspot = self
            .hotspot
            .as_ref()
            .filter(|(s, id)| s == scope && client.contains(id))
            .map(|(_, id)| id.clone());
        let (target, ratio) = match hotspot {
            Some(id) if self.rng.hit_rate_percent(self.config.hotspot_percent) => (id, 0.1),
            _ => {
                let target = self
                    .pick_item(client)
                    .map(|item| item.id.clone())
                    .context("client snapshot is empty")?;
                let ratio = if self.rng.hit_rate_percent(self.config.nest_percent) {
                    0.35 + 0.3 * self.rng.next_unit()
                } else {
                    self.rng.next_unit()
                };
                (target, ratio)
            }
        };

        let descriptor = MoveDescriptor {
            dragged_ids: dragged.clone(),
            target_id: target.clone(),
            pointer_offset_ratio: ratio,
        };

        let outcome = match self
            .coordinator
            .resolve_descriptor(client, &descriptor, &mut self.client_rng)
        {
            Err(err) => {
                self.stats.client_rejections += 1;
                let server_rejects = match &err {
                    ReorderError::CircularParentRejected { parent, .. } => {
                        Some(self.server_rejects_parent(scope, server, &dragged, parent))
                    }
                    _ => None,
                };
                let code = err.code();
                tracing::debug!(
                    error = %err,
                    %code,
                    reason = code.message(),
                    hint = code.hint().unwrap_or("-"),
                    "client rejected drop"
                );
                MoveOutcome::ClientRejected {
                    code: code.code().to_string(),
                    server_rejects,
                }
            }
            Ok(plan) => {
                if plan.rebalanced {
                    self.stats.rebalances += 1;
                }
                match self.validator.reconcile(server, client, &plan) {
                    Err(err) => {
                        self.stats.server_rejections += 1;
                        let code = err.code();
                        tracing::debug!(
                            error = %err,
                            %code,
                            reason = code.message(),
                            hint = code.hint().unwrap_or("-"),
                            "server rejected plan"
                        );
                        MoveOutcome::ServerRejected {
                            code: code.code().to_string(),
                        }
                    }
                    Ok(reconciled) => {
                        let batch = UpdateBatch::from_reconciliation(&reconciled);
                        if !batch.is_empty() {
                            self.store
                                .persist(&batch)
                                .with_context(|| format!("persist move onto {target}"))?;
                        }
                        let matched = reconciled.report.matched;
                        if !matched {
                            self.stats.mismatches += 1;
                        }
                        self.stats.moves_applied += 1;
                        self.hotspot = Some((scope.clone(), target.clone()));
                        MoveOutcome::Applied {
                            rebalanced: plan.rebalanced,
                            matched,
                            updates: batch.len(),
                        }
                    }
                }
            }
        };

        Ok(Action::Move {
            dragged,
            target,
            ratio,
            outcome,
        })
    }

    /// Ask the authoritative side whether `parent` is a legal parent for
    /// `dragged`.
    fn server_rejects_parent(
        &self,
        scope: &ScopeId,
        server: &Snapshot,
        dragged: &[ItemId],
        parent: &ItemId,
    ) -> bool {
        let mut seen = BTreeSet::new();
        let mv = AuthoritativeMove {
            scope_id: scope.clone(),
            dragged: dragged.iter().filter(|id| seen.insert(*id)).cloned().collect(),
            new_parent_id: Some(parent.clone()),
            hint: InsertionHint::Start,
        };
        matches!(
            self.validator.execute(server, &mv),
            Err(ValidationError::CircularParent { .. })
        )
    }

    fn create(&mut self, scope: &ScopeId, client: &Snapshot) -> Result<Action> {
        let parent = if self.rng.hit_rate_percent(50) {
            self.pick_item(client).map(|item| item.id.clone())
        } else {
            None
        };
        let siblings = client.sibling_group(scope, parent.as_ref(), &BTreeSet::new());
        let at = match self.rng.next_bounded(3) {
            0 => InsertAt::Start,
            1 if !siblings.is_empty() => {
                InsertAt::After(siblings[self.rng.next_index(siblings.len())].id.clone())
            }
            _ => InsertAt::End,
        };

        let id = self.fresh_id(scope);
        let server = self.store.snapshot(scope);
        let accepted = match self.coordinator.place_new(
            &server,
            id.clone(),
            scope,
            parent.as_ref(),
            &at,
            &mut self.server_rng,
        ) {
            Ok(placement) => {
                if placement.rebalanced {
                    self.stats.rebalances += 1;
                }
                self.store
                    .create(&placement)
                    .with_context(|| format!("store new item {id}"))?;
                self.stats.creates += 1;
                true
            }
            Err(err) => {
                self.stats.server_rejections += 1;
                let code = err.code();
                tracing::debug!(
                    error = %err,
                    %code,
                    reason = code.message(),
                    hint = code.hint().unwrap_or("-"),
                    "server rejected create"
                );
                false
            }
        };

        Ok(Action::Create {
            id,
            parent,
            accepted,
        })
    }

    fn delete(&mut self, server: &Snapshot) -> Action {
        let Some(victim) = self.pick_item(server).map(|item| item.id.clone()) else {
            return Action::Delete {
                id: ItemId::new(""),
                removed: 0,
            };
        };
        let subtree = server.subtree_ids(&victim);
        let removed = subtree
            .iter()
            .filter(|id| self.store.remove(id).is_some())
            .count();
        self.stats.deletes += 1;
        Action::Delete {
            id: victim,
            removed,
        }
    }
}
