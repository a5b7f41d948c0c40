//! The trace: an ordered, linear chain of relational steps.

use serde::{Deserialize, Serialize};

use tessera_expr::{Binding, Expr, OrderKey};

use crate::env::SchemaHint;
use crate::steps::{
    AggregateStep, BindStep, DistinctStep, FilterStep, IterateStep, LimitStep, OrderStep,
    OutputStep, ScanStep, Step, UnpivotStep,
};

/// Identifier of a trace within one compilation.
pub type TraceId = u32;

/// Limits at or below this classify as [`SizeClass::ExactSmall`]; larger
/// limits stay unbounded so list replacements remain hashable.
pub const EXACT_SMALL_LIMIT: u64 = 10_000;

/// A compile-time bound on a trace's output size.
///
/// The order is significant: optimizer passes may only move a trace's class
/// downward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SizeClass {
    /// No rows.
    Zero,
    /// Exactly zero or one row.
    One,
    /// A small constant bound (a `LIMIT`).
    ExactSmall,
    /// Bounded by the cardinality of grouping or distinct columns.
    ColumnCardinality,
    /// No useful bound.
    Unbounded,
}

/// The optimized, linear relational plan produced by the builder.
///
/// Steps are stored leaf-first: `steps[0]` is the source and the terminal
/// step is last, so the parent of `steps[i]` is `steps[i - 1]`. Hoisted
/// sub-queries live in `replacements` and are referenced from step
/// expressions by integer index; a correlated sub-trace's `parent` id is
/// the trace that lexically encloses it at build time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    /// The step chain, leaf first.
    pub steps: Vec<Step>,
    final_bindings: Vec<Binding>,
    /// Whether the final output is the whole input row (`SELECT *`).
    pub star_output: bool,
    /// Hoisted sub-traces, referenced by index from replacement calls.
    pub replacements: Vec<Trace>,
    /// This trace's identifier.
    pub id: TraceId,
    /// The lexically enclosing trace, if any.
    pub parent: Option<TraceId>,
    pub(crate) scope: Vec<String>,
    /// Partitioning hint for the executor: group keys that are direct
    /// fields of the leaf scan.
    pub partition_keys: Vec<String>,
}

impl Trace {
    /// Create an empty trace.
    pub fn new(id: TraceId, parent: Option<TraceId>) -> Self {
        Self {
            steps: Vec::new(),
            final_bindings: Vec::new(),
            star_output: false,
            replacements: Vec::new(),
            id,
            parent,
            scope: Vec::new(),
            partition_keys: Vec::new(),
        }
    }

    /// The frozen final output bindings. Empty when `star_output` is set.
    pub fn final_bindings(&self) -> &[Binding] {
        &self.final_bindings
    }

    /// Mutable access to the final bindings.
    pub fn final_bindings_mut(&mut self) -> &mut Vec<Binding> {
        &mut self.final_bindings
    }

    pub(crate) fn set_final(&mut self, bindings: Vec<Binding>, star: bool) {
        self.final_bindings = bindings;
        self.star_output = star;
    }

    /// Append a scan step.
    pub fn push_scan(&mut self, table: Binding, hint: Option<SchemaHint>) {
        let name = table.result();
        if !name.is_empty() {
            self.scope.push(name);
        }
        self.steps.push(Step::Scan(ScanStep { table, hint }));
        self.set_final(Vec::new(), true);
    }

    /// Append a cross-product iteration step.
    pub fn push_iterate(&mut self, binding: Binding) {
        let name = binding.result();
        if !name.is_empty() {
            self.scope.push(name);
        }
        self.steps.push(Step::Iterate(IterateStep { binding }));
        self.set_final(Vec::new(), true);
    }

    /// Append a filter step.
    pub fn push_filter(&mut self, predicate: Expr) {
        self.steps.push(Step::Filter(FilterStep::new(predicate)));
    }

    /// Append a projection step and freeze it as the current output set.
    pub fn push_bind(&mut self, bindings: Vec<Binding>) {
        self.set_final(bindings.clone(), false);
        self.steps.push(Step::Bind(BindStep::new(bindings)));
    }

    /// Append a star projection.
    pub fn push_bind_star(&mut self) {
        self.steps.push(Step::BindStar);
        self.set_final(Vec::new(), true);
    }

    /// Append an aggregation step.
    pub fn push_aggregate(&mut self, aggs: Vec<Binding>, group_by: Vec<Binding>) {
        let mut out = group_by.clone();
        out.extend(aggs.iter().cloned());
        self.set_final(out, false);
        self.steps.push(Step::Aggregate(AggregateStep::new(aggs, group_by)));
    }

    /// Append a distinct step.
    pub fn push_distinct(&mut self, exprs: Vec<Expr>) {
        self.steps.push(Step::Distinct(DistinctStep::new(exprs)));
    }

    /// Append a sort step.
    pub fn push_order(&mut self, keys: Vec<OrderKey>) {
        self.steps.push(Step::Order(OrderStep::new(keys)));
    }

    /// Append a LIMIT/OFFSET step.
    pub fn push_limit(&mut self, limit: u64, offset: u64) {
        self.steps.push(Step::LimitOffset(LimitStep { limit, offset }));
    }

    /// Append an unpivot step over the current input.
    pub fn push_unpivot(&mut self, as_label: Option<String>, at_label: Option<String>) {
        let mut out = Vec::new();
        for label in [&as_label, &at_label].into_iter().flatten() {
            self.scope.push(label.clone());
            out.push(Binding::named(Expr::path(label.clone()), label.clone()));
        }
        self.steps.push(Step::Unpivot(UnpivotStep { as_label, at_label }));
        self.set_final(out, false);
    }

    /// Append an INTO sink step.
    pub fn push_output(&mut self, path: Expr, target: String) {
        self.steps.push(Step::Output(OutputStep { path, target }));
    }

    /// Append a zero-row source.
    pub fn push_dummy(&mut self) {
        self.steps.push(Step::DummyOutput);
        self.set_final(Vec::new(), false);
    }

    /// Append a pseudo-table marker.
    pub fn push_pseudo_table(&mut self) {
        self.steps.push(Step::PseudoTable);
    }

    /// The cardinality class of the whole trace.
    pub fn class(&self) -> SizeClass {
        fold_class(&self.steps)
    }

    /// The cardinality class of the input feeding `steps[index]`.
    pub fn class_below(&self, index: usize) -> SizeClass {
        fold_class(&self.steps[..index])
    }

    /// Render the step chain, leaf first, one step per line.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        for s in &self.steps {
            out.push_str(&s.to_string());
            out.push('\n');
        }
        for (i, r) in self.replacements.iter().enumerate() {
            out.push_str(&format!("WITH REPLACEMENT({i}):\n"));
            for line in r.explain().lines() {
                out.push_str("  ");
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }

    /// The frozen output names in order.
    pub fn output_names(&self) -> Vec<String> {
        self.final_bindings.iter().map(Binding::result).collect()
    }

    /// The largest trace id used by this trace and its replacements.
    pub(crate) fn max_trace_id(&self) -> TraceId {
        self.replacements
            .iter()
            .map(Trace::max_trace_id)
            .fold(self.id, TraceId::max)
    }
}

/// Structural equality: step chains, outputs, and replacements; trace ids
/// and build-time scopes are ignored.
impl PartialEq for Trace {
    fn eq(&self, other: &Self) -> bool {
        self.steps == other.steps
            && self.final_bindings == other.final_bindings
            && self.star_output == other.star_output
            && self.replacements == other.replacements
    }
}

impl std::fmt::Display for Trace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.explain())
    }
}

fn fold_class(steps: &[Step]) -> SizeClass {
    let mut class = SizeClass::Unbounded;
    for step in steps {
        class = match step {
            Step::Scan(_) | Step::Iterate(_) => SizeClass::Unbounded,
            Step::DummyOutput => SizeClass::Zero,
            Step::Unpivot(_) => {
                if class == SizeClass::Zero {
                    SizeClass::Zero
                } else {
                    SizeClass::Unbounded
                }
            }
            Step::Aggregate(a) => {
                if a.is_global() {
                    // a global aggregate emits its identity row even over
                    // an empty input
                    SizeClass::One
                } else {
                    class.min(SizeClass::ColumnCardinality)
                }
            }
            Step::Distinct(_) => class.min(SizeClass::ColumnCardinality),
            Step::LimitOffset(l) => {
                if l.limit == 0 {
                    SizeClass::Zero
                } else if l.limit == 1 {
                    class.min(SizeClass::One)
                } else if l.limit <= EXACT_SMALL_LIMIT {
                    class.min(SizeClass::ExactSmall)
                } else {
                    class
                }
            }
            _ => class,
        };
    }
    class
}
