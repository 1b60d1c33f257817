//! Migration plan model and rendering.

use crate::introspect::ObjectKind;

/// An atomic unit of a migration plan.
///
/// A step's statements must run in order and together; the planner never
/// splits a step across transaction boundaries.
#[derive(Debug, Clone)]
pub struct MigrationStep {
    /// Kind of the object this step touches.
    pub kind: ObjectKind,
    /// Lowercased name of the object this step touches.
    pub target_name: String,
    /// The executable statements, in order.
    pub statements: Vec<String>,
    /// True when the step is only legal with deferred foreign-key
    /// enforcement (the rename half of a table rewrite).
    pub requires_deferred_fk: bool,
}

impl MigrationStep {
    pub(crate) fn new(kind: ObjectKind, target_name: impl Into<String>, statements: Vec<String>) -> Self {
        Self {
            kind,
            target_name: target_name.into(),
            statements,
            requires_deferred_fk: false,
        }
    }

    pub(crate) fn deferred(mut self) -> Self {
        self.requires_deferred_fk = true;
        self
    }
}

/// An ordered sequence of migration steps.
///
/// Created pure-functionally from two schema snapshots, executed once,
/// then discarded.
#[derive(Debug, Clone, Default)]
pub struct MigrationPlan {
    /// Steps in execution order.
    pub steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    /// True when there is nothing to do: the current schema already
    /// matches the target.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// True iff any step requires deferred foreign-key enforcement. The
    /// rendered plan brackets itself in `PRAGMA defer_foreign_keys`
    /// exactly when this holds.
    pub fn any_deferred_fk(&self) -> bool {
        self.steps.iter().any(|s| s.requires_deferred_fk)
    }
}

/// Renders a plan as executable statements.
///
/// With `pretty`, a `-- KIND: name` comment introduces each group of
/// steps for the same object and groups are separated by blank lines —
/// suitable for writing to a migration file. Without it, the result is
/// statements only, suitable for a batched prepare.
pub fn render_plan(plan: &MigrationPlan, pretty: bool) -> Vec<String> {
    let mut lines = Vec::new();
    if plan.is_empty() {
        return lines;
    }

    let deferred = plan.any_deferred_fk();
    if deferred {
        lines.push("PRAGMA defer_foreign_keys = ON".to_string());
    }

    let mut previous: Option<(ObjectKind, &str)> = None;
    for step in &plan.steps {
        if pretty {
            let group = (step.kind, step.target_name.as_str());
            if previous != Some(group) {
                if previous.is_some() || deferred {
                    lines.push(String::new());
                }
                lines.push(format!("-- {}: {}", step.kind.keyword(), step.target_name));
                previous = Some(group);
            }
        }
        lines.extend(step.statements.iter().cloned());
    }

    if deferred {
        if pretty {
            lines.push(String::new());
        }
        lines.push("PRAGMA defer_foreign_keys = OFF".to_string());
    }
    lines
}
