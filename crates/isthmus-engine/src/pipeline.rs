//! Engine pipeline orchestrator.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, warn};
use uuid::Uuid;

use isthmus_catalog::TypeCatalog;
use isthmus_codegen::{
    plan_constant, plan_function, plan_type, render_pair, ArtifactPair, ArtifactSet, CodegenError,
    GlueExecutor, GluePlan,
};
use isthmus_core::{
    BridgeError, DeclaredConstant, DeclaredFunction, DeclaredItem, DeclaredType, Finding,
    InterfaceDescription, ItemId, QualifiedName, Side,
};
use isthmus_ownership::OwnershipResolver;
use isthmus_runtime::HandleTable;
use isthmus_verify::{check_constant, check_signature, verify, ReportEntry, VerificationReport};

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::gate::{gate_or_halt, verification_gate, GateConfig, GateDecision};

/// Output of one engine run.
#[derive(Debug)]
pub struct RunOutput {
    pub run_id: Uuid,
    pub report: VerificationReport,
    /// Artifacts of every item that was not rejected.
    pub artifacts: ArtifactSet,
    pub plans: BTreeMap<ItemId, GluePlan>,
    /// The catalog the run resolved its edges in.
    pub catalog: TypeCatalog,
    /// Items that finished before the run ended.
    pub completed: usize,
    pub total: usize,
    pub duration_ms: u64,
}

impl RunOutput {
    pub fn is_cancelled(&self) -> bool {
        self.completed < self.total
    }

    pub fn gate(&self, config: &GateConfig) -> GateDecision {
        verification_gate(&self.report, config)
    }

    /// An executor with every generated function plan registered. Natives
    /// still have to be bound by the caller.
    pub fn executor<'a>(&'a self, table: &'a HandleTable) -> GlueExecutor<'a> {
        let mut exec = GlueExecutor::new(&self.catalog, table);
        for plan in self.plans.values() {
            if let GluePlan::Function(plan) = plan {
                exec.register(plan.clone());
            }
        }
        exec
    }

    pub fn write_artifacts(&self, dir: &Path, config: &EngineConfig) -> Result<Vec<PathBuf>> {
        Ok(self.artifacts.write_to(dir, &config.codegen)?)
    }
}

/// Per-item result before assembly.
struct ItemOutcome {
    entry: ReportEntry,
    plan: Option<GluePlan>,
    artifacts: Option<ArtifactPair>,
}

impl ItemOutcome {
    fn bare(entry: ReportEntry) -> Self {
        Self {
            entry,
            plan: None,
            artifacts: None,
        }
    }

    fn failed(item: ItemId, errors: &[BridgeError]) -> Self {
        Self::bare(ReportEntry::failed(item, errors))
    }

    fn unrenderable(item: ItemId, err: CodegenError) -> Self {
        let err = BridgeError::rejected(item.clone(), err.to_string());
        Self::failed(item, &[err])
    }

    fn rendered(entry: ReportEntry, plan: GluePlan) -> Self {
        let artifacts = render_pair(&plan);
        Self {
            entry,
            plan: Some(plan),
            artifacts: Some(artifacts),
        }
    }
}

fn attribute(err: BridgeError, item: &ItemId) -> BridgeError {
    if err.item() == item {
        err
    } else {
        err.reattributed(item.clone())
    }
}

/// Shared, read-only state of the per-item stages.
struct ItemContext<'r> {
    catalog: &'r TypeCatalog,
    resolver: &'r OwnershipResolver,
    registration: &'r BTreeMap<ItemId, Vec<BridgeError>>,
    /// A-side type names declared in the description.
    declared_a: &'r BTreeSet<QualifiedName>,
    config: &'r EngineConfig,
    cancel: &'r CancelToken,
}

impl ItemContext<'_> {
    fn checkpoint(&self) -> Option<()> {
        (!self.cancel.is_cancelled()).then_some(())
    }

    /// Run one item through its stages. `None` when the run was cancelled
    /// before the item finished.
    fn process(&self, item: DeclaredItem<'_>) -> Option<ItemOutcome> {
        self.checkpoint()?;
        let id = item.id();
        if let Some(errors) = self.registration.get(&id) {
            return Some(ItemOutcome::failed(id, errors));
        }
        let outcome = match item {
            DeclaredItem::Type(ty) => self.process_type(id, ty),
            DeclaredItem::Constant(constant) => self.process_constant(id, constant),
            DeclaredItem::Function(func) => self.process_function(id, func),
        }?;
        debug!(item = %outcome.entry.item, finding = %outcome.entry.finding, "item finished");
        Some(outcome)
    }

    fn process_type(&self, id: ItemId, ty: &DeclaredType) -> Option<ItemOutcome> {
        let edge = match self.catalog.edge_for(ty.side, &ty.name) {
            Ok(edge) => edge,
            Err(err) => {
                let err = attribute(err, &id);
                return Some(ItemOutcome::failed(id, &[err]));
            }
        };
        self.checkpoint()?;

        let entry = ReportEntry::new(id.clone(), Finding::Proved);
        // A pair declared on both sides is emitted once, from side A.
        if ty.side == Side::B && self.declared_a.contains(&edge.a) {
            return Some(ItemOutcome::bare(entry));
        }
        Some(match plan_type(self.catalog, ty, &self.config.codegen) {
            Ok(plan) => ItemOutcome::rendered(entry, GluePlan::Type(plan)),
            Err(err) => ItemOutcome::unrenderable(id, err),
        })
    }

    fn process_constant(&self, id: ItemId, constant: &DeclaredConstant) -> Option<ItemOutcome> {
        let edge = match check_constant(self.catalog, constant) {
            Ok(edge) => edge,
            Err(err) => return Some(ItemOutcome::failed(id, &[err])),
        };
        self.checkpoint()?;
        let plan = plan_constant(self.catalog, constant, &edge, &self.config.codegen);
        Some(ItemOutcome::rendered(
            ReportEntry::new(id, Finding::Proved),
            GluePlan::Constant(plan),
        ))
    }

    fn process_function(&self, id: ItemId, func: &DeclaredFunction) -> Option<ItemOutcome> {
        let ownership = match self.resolver.resolve_function(self.catalog, func) {
            Ok(ownership) => ownership,
            Err(err) => return Some(ItemOutcome::failed(id, &[err])),
        };
        self.checkpoint()?;

        let sig = match check_signature(self.catalog, func, &ownership) {
            Ok(sig) => sig,
            Err(errors) => return Some(ItemOutcome::failed(id, &errors)),
        };
        self.checkpoint()?;

        let finding = verify(self.catalog, &sig, &self.config.profile);
        if let Finding::Rejected(reason) = &finding {
            let err = BridgeError::rejected(id.clone(), reason.clone());
            let mut entry = ReportEntry::new(id, finding.clone());
            entry.errors.push((&err).into());
            return Some(ItemOutcome::bare(entry));
        }
        self.checkpoint()?;

        Some(
            match plan_function(self.catalog, &sig, &finding, &self.config.codegen) {
                Ok(plan) => {
                    ItemOutcome::rendered(ReportEntry::new(id, finding), GluePlan::Function(plan))
                }
                Err(err) => ItemOutcome::unrenderable(id, err),
            },
        )
    }
}

/// The bridge engine: runs an Interface Description through the pipeline.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
    cancel: CancelToken,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// A token that cancels runs of this engine.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run every declared item through the pipeline:
    /// catalog -> ownership -> signature check -> safety verification -> glue.
    ///
    /// Failures are item-scoped and land in the report. A cancelled run
    /// reports only the items that finished.
    pub fn run(&self, desc: &InterfaceDescription) -> RunOutput {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        let items = desc.items();
        info!(%run_id, bridge = %desc.bridge.name, items = items.len(), "starting run");

        // Stage 1: Type catalog
        let (catalog, errors) = TypeCatalog::from_description(desc, self.config.catalog);
        let mut registration: BTreeMap<ItemId, Vec<BridgeError>> = BTreeMap::new();
        for err in errors {
            registration.entry(err.item().clone()).or_default().push(err);
        }

        // Conversion failures may name a type the description never declared.
        let declared: BTreeSet<ItemId> = items.iter().map(DeclaredItem::id).collect();
        let mut entries: Vec<ReportEntry> = registration
            .iter()
            .filter(|(item, _)| !declared.contains(*item))
            .map(|(item, errors)| ReportEntry::failed(item.clone(), errors))
            .collect();

        // Stages 2-5: ownership, signature, safety, glue; independent per item
        let resolver = OwnershipResolver::new();
        let declared_a: BTreeSet<QualifiedName> = desc
            .types
            .iter()
            .filter(|t| t.side == Side::A)
            .map(|t| t.name.clone())
            .collect();
        let ctx = ItemContext {
            catalog: &catalog,
            resolver: &resolver,
            registration: &registration,
            declared_a: &declared_a,
            config: &self.config,
            cancel: &self.cancel,
        };
        let outcomes: Vec<Option<ItemOutcome>> = if self.config.parallel {
            items.par_iter().map(|item| ctx.process(*item)).collect()
        } else {
            items.iter().map(|item| ctx.process(*item)).collect()
        };

        // Stage 6: Assembly, in declaration order
        let total = outcomes.len();
        let mut completed = 0;
        let mut seen = BTreeSet::new();
        let mut artifacts = ArtifactSet::new();
        let mut plans = BTreeMap::new();
        for outcome in outcomes.into_iter().flatten() {
            completed += 1;
            // Duplicate declarations share an identity and one entry.
            if !seen.insert(outcome.entry.item.clone()) {
                continue;
            }
            if let Some(pair) = outcome.artifacts {
                artifacts.insert_pair(pair);
            }
            if let Some(plan) = outcome.plan {
                plans.insert(plan.item().clone(), plan);
            }
            entries.push(outcome.entry);
        }

        let report = VerificationReport::build(desc.bridge.name.clone(), entries)
            .with_run_id(run_id.to_string());
        let duration_ms = start.elapsed().as_millis() as u64;
        if completed < total {
            warn!(%run_id, completed, total, "run cancelled");
        }
        info!(
            %run_id,
            proved = report.summary.proved,
            guarded = report.summary.guarded,
            rejected = report.summary.rejected,
            artifacts = artifacts.len(),
            duration_ms,
            "run finished"
        );

        RunOutput {
            run_id,
            report,
            artifacts,
            plans,
            catalog,
            completed,
            total,
            duration_ms,
        }
    }

    /// Run and apply the verification gate. A cancelled run never passes.
    pub fn run_gated(&self, desc: &InterfaceDescription) -> Result<RunOutput> {
        let output = self.run(desc);
        if output.is_cancelled() {
            return Err(EngineError::Cancelled {
                completed: output.completed,
                total: output.total,
            });
        }
        gate_or_halt(&output.report, &self.config.gate)?;
        Ok(output)
    }

    /// Load a description file and run it.
    pub fn run_path(&self, path: &Path) -> Result<RunOutput> {
        let desc = InterfaceDescription::load(path)?;
        Ok(self.run(&desc))
    }
}
