//! Threads change records through the stages of a write query.
//!
//! Each nested write runs in its own scope. A scope collects `MutationMeta` entries and
//! flushes them into a list variable at every stage boundary (`WITH`). Child scopes hand
//! their list up to the parent when they return, so the top level ends with one flat list
//! of every change the query made.

use serde::{Deserialize, Serialize};

use crate::ast::{BinaryOperator, Clause, Expr, Projection, ReturnItem};
use crate::constants::cypher;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetaKind {
    Created,
    Updated,
    Deleted,
    Connected,
    Disconnected,
    RelationshipUpdated,
}

impl MetaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Updated => "Updated",
            Self::Deleted => "Deleted",
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
            Self::RelationshipUpdated => "RelationshipUpdated",
        }
    }
}

/// How one side of a change is identified. Abstract relationship targets are only known
/// by their labels until the events are parsed.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub enum Side {
    Typename(String),
    Labels,
}

/// One graph change, as the Cypher map expression that records it
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct MutationMeta {
    pub kind: MetaKind,
    pub entries: Vec<(String, Expr)>,
}

impl MutationMeta {
    fn new(kind: MetaKind) -> Self {
        Self {
            kind,
            entries: vec![("type".to_string(), Expr::string(kind.as_str()))],
        }
    }

    fn entry(mut self, key: &str, value: Expr) -> Self {
        self.entries.push((key.to_string(), value));
        self
    }

    fn side(self, variable: &str, side: &Side, name_key: &str, labels_key: &str) -> Self {
        match side {
            Side::Typename(name) => self.entry(name_key, Expr::string(name)),
            Side::Labels => self.entry(labels_key, Expr::func("labels", vec![Expr::var(variable)])),
        }
    }

    fn stamped(self) -> Self {
        self.entry("timestamp", Expr::func("timestamp", vec![]))
    }

    pub fn created(variable: &str, typename: &str) -> Self {
        Self::new(MetaKind::Created)
            .entry("id", Expr::Id(Box::new(Expr::var(variable))))
            .entry("name", Expr::string(typename))
            .entry(
                "properties",
                Expr::Map(vec![("new".to_string(), Expr::all_properties(variable))]),
            )
            .stamped()
    }

    /// `old` is the snapshot taken before the `SET`
    pub fn updated(variable: &str, typename: &str, old: Expr) -> Self {
        Self::new(MetaKind::Updated)
            .entry("id", Expr::Id(Box::new(Expr::var(variable))))
            .entry("name", Expr::string(typename))
            .entry(
                "properties",
                Expr::Map(vec![
                    ("old".to_string(), old),
                    ("new".to_string(), Expr::all_properties(variable)),
                ]),
            )
            .stamped()
    }

    /// Must be recorded while `variable` is still bound to the node, before it is deleted
    pub fn deleted(variable: &str, typename: &str) -> Self {
        Self::new(MetaKind::Deleted)
            .entry("id", Expr::Id(Box::new(Expr::var(variable))))
            .entry("name", Expr::string(typename))
            .entry(
                "properties",
                Expr::Map(vec![("old".to_string(), Expr::all_properties(variable))]),
            )
            .stamped()
    }

    fn edge(
        kind: MetaKind,
        from: (&str, &Side),
        relationship: (&str, Expr),
        to: (&str, &Side),
    ) -> Self {
        let (from_variable, from_side) = from;
        let (edge_variable, relationship_name) = relationship;
        let (to_variable, to_side) = to;
        Self::new(kind)
            .entry("id", Expr::Id(Box::new(Expr::var(from_variable))))
            .side(from_variable, from_side, "name", "labels")
            .entry("toID", Expr::Id(Box::new(Expr::var(to_variable))))
            .side(to_variable, to_side, "toName", "toLabels")
            .entry("relationshipName", relationship_name)
            .entry("relationshipID", Expr::Id(Box::new(Expr::var(edge_variable))))
            .entry(
                "properties",
                Expr::Map(vec![
                    ("from".to_string(), Expr::all_properties(from_variable)),
                    ("to".to_string(), Expr::all_properties(to_variable)),
                    (
                        "relationship".to_string(),
                        Expr::all_properties(edge_variable),
                    ),
                ]),
            )
            .stamped()
    }

    pub fn connected(from: (&str, &Side), relationship: (&str, &str), to: (&str, &Side)) -> Self {
        let (edge, name) = relationship;
        Self::edge(MetaKind::Connected, from, (edge, Expr::string(name)), to)
    }

    pub fn disconnected(
        from: (&str, &Side),
        relationship: (&str, &str),
        to: (&str, &Side),
    ) -> Self {
        let (edge, name) = relationship;
        Self::edge(MetaKind::Disconnected, from, (edge, Expr::string(name)), to)
    }

    pub fn relationship_updated(
        from: (&str, &Side),
        relationship: (&str, &str),
        to: (&str, &Side),
    ) -> Self {
        let (edge, name) = relationship;
        Self::edge(MetaKind::RelationshipUpdated, from, (edge, Expr::string(name)), to)
    }

    /// Disconnection of an arbitrary relationship, as cascaded by `DETACH DELETE`. Both
    /// sides and the relationship type are read from the graph.
    pub fn detached(from: &str, edge: &str, to: &str) -> Self {
        let name = Expr::func("type", vec![Expr::var(edge)]);
        Self::edge(
            MetaKind::Disconnected,
            (from, &Side::Labels),
            (edge, name),
            (to, &Side::Labels),
        )
    }

    pub fn to_expr(&self) -> Expr {
        Expr::Map(self.entries.clone())
    }
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(pub usize);

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Scope {
    pub name: String,
    pub parent: Option<ScopeId>,
    pub variables: Vec<String>,
    pub mutate_meta_list_var_name: String,
    pub mutate_meta_variable_declared: bool,
    pending: Vec<MutationMeta>,
    /// Child list variables to add at the next flush
    pending_children: Vec<String>,
    /// Every child merged into this scope
    merged_children: Vec<ScopeId>,
    /// Entries already written into the list variable
    flushed: Vec<MutationMeta>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageOptions {
    /// Fold list-of-lists produced under an aggregation back into one list
    pub reduce_meta: bool,
}

/// Arena of nested write scopes. Scope 0 is the top level.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct WithProjector {
    scopes: Vec<Scope>,
    enabled: bool,
}

impl WithProjector {
    /// `enabled` is false when nobody consumes the metadata, in which case nothing is emitted
    pub fn new(variables: &[&str], enabled: bool) -> Self {
        Self {
            scopes: vec![Scope {
                name: String::new(),
                parent: None,
                variables: variables.iter().map(|v| v.to_string()).collect(),
                mutate_meta_list_var_name: cypher::MUTATE_META.to_string(),
                mutate_meta_variable_declared: false,
                pending: vec![],
                pending_children: vec![],
                merged_children: vec![],
                flushed: vec![],
            }],
            enabled,
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    pub fn add_variable(&mut self, id: ScopeId, variable: &str) {
        let scope = &mut self.scopes[id.0];
        if !scope.variables.iter().any(|v| v == variable) {
            scope.variables.push(variable.to_string());
        }
    }

    pub fn mark_mutation_meta(&mut self, id: ScopeId, meta: MutationMeta) {
        if self.enabled {
            self.scopes[id.0].pending.push(meta);
        }
    }

    pub fn create_child(&mut self, parent: ScopeId, name: &str) -> ScopeId {
        let variables = self.scopes[parent.0].variables.clone();
        self.scopes.push(Scope {
            name: name.to_string(),
            parent: Some(parent),
            variables,
            mutate_meta_list_var_name: format!("{name}_{}", cypher::MUTATE_META),
            mutate_meta_variable_declared: false,
            pending: vec![],
            pending_children: vec![],
            merged_children: vec![],
            flushed: vec![],
        });
        ScopeId(self.scopes.len() - 1)
    }

    /// Queues the list returned by `child` for the parent's next flush
    pub fn merge_with_child(&mut self, parent: ScopeId, child: ScopeId) {
        if !self.enabled || !self.scopes[child.0].mutate_meta_variable_declared {
            return;
        }
        let list = self.scopes[child.0].mutate_meta_list_var_name.clone();
        let scope = &mut self.scopes[parent.0];
        scope.pending_children.push(list);
        scope.merged_children.push(child);
    }

    /// Running list expression of `id`, consuming pending entries. `None` when there is
    /// nothing to carry.
    fn flush(&mut self, id: ScopeId) -> Option<Expr> {
        if !self.enabled {
            return None;
        }
        let scope = &mut self.scopes[id.0];
        let mut addends = vec![];
        if scope.mutate_meta_variable_declared {
            addends.push(Expr::var(&scope.mutate_meta_list_var_name));
        }
        if !scope.pending.is_empty() {
            let entries = scope.pending.iter().map(MutationMeta::to_expr).collect();
            addends.push(meta_filter(Expr::List(entries)));
            scope.flushed.append(&mut scope.pending);
        }
        addends.extend(scope.pending_children.drain(..).map(Expr::var));
        let expr = addends
            .into_iter()
            .reduce(|acc, next| Expr::binary(acc, BinaryOperator::Add, next))?;
        scope.mutate_meta_variable_declared = true;
        Some(expr)
    }

    /// `WITH <variables>, <running list> AS <list variable>`
    pub fn next_stage_variables(&mut self, id: ScopeId, options: StageOptions) -> Clause {
        let list = self.scopes[id.0].mutate_meta_list_var_name.clone();
        let meta = self.flush(id);
        let scope = &self.scopes[id.0];
        let mut items: Vec<ReturnItem> = scope
            .variables
            .iter()
            .filter(|v| **v != list)
            .map(|v| ReturnItem::var(v))
            .collect();
        if let Some(meta) = meta {
            let meta = if options.reduce_meta {
                Expr::flatten_collected(meta)
            } else {
                meta
            };
            items.push(ReturnItem::new(meta, list));
        }
        if items.is_empty() {
            items.push(ReturnItem::star());
        }
        Clause::With {
            projection: Projection::items(items),
            filter: None,
        }
    }

    /// Clause ending a child subquery. Exports the child's list, or nothing at all when
    /// metadata is disabled, which leaves the subquery a unit subquery.
    pub fn next_return(&mut self, id: ScopeId, options: StageOptions) -> Option<Clause> {
        let item = self.return_item(id, options)?;
        Some(Clause::Return(Projection::items(vec![item])))
    }

    /// `<running list> AS <list variable>` for a `RETURN` that exports other columns too
    pub fn return_item(&mut self, id: ScopeId, options: StageOptions) -> Option<ReturnItem> {
        if !self.enabled {
            return None;
        }
        let list = self.scopes[id.0].mutate_meta_list_var_name.clone();
        let meta = self.flush(id).unwrap_or_else(|| Expr::List(vec![]));
        self.scopes[id.0].mutate_meta_variable_declared = true;
        let meta = if options.reduce_meta {
            Expr::flatten_collected(meta)
        } else {
            meta
        };
        Some(ReturnItem::new(meta, list))
    }

    /// Top level list expression for the final `RETURN`
    pub fn final_list(&mut self) -> Option<Expr> {
        let root = self.root();
        let declared = self.scopes[0].mutate_meta_variable_declared;
        match self.flush(root) {
            Some(expr) => Some(expr),
            None if declared => Some(Expr::var(cypher::MUTATE_META)),
            None if self.enabled => Some(Expr::List(vec![])),
            None => None,
        }
    }

    /// Entries that reach the top level through `id` and the children merged into it
    pub fn surfaced(&self, id: ScopeId) -> Vec<&MutationMeta> {
        let mut out = vec![];
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let scope = &self.scopes[next.0];
            out.extend(scope.flushed.iter());
            stack.extend(scope.merged_children.iter().rev());
        }
        out
    }
}

/// `[metaVal IN list WHERE <complete entry>]`
fn meta_filter(list: Expr) -> Expr {
    let meta_val = || Expr::var("metaVal");
    Expr::ListComprehension {
        variable: "metaVal".to_string(),
        source: Box::new(list),
        filter: Some(Box::new(Expr::And(vec![
            Expr::is_not_null(meta_val()),
            Expr::is_not_null(meta_val().dot("id")),
            Expr::Or(vec![
                Expr::is_not_null(meta_val().dot("toID")),
                Expr::is_null(meta_val().dot("toName")),
            ]),
        ]))),
        map: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Dialect, Statement};

    fn render(clause: Clause) -> String {
        Statement::new(vec![clause]).render(Dialect::default())
    }

    const FILTER: &str = "WHERE (metaVal IS NOT NULL AND metaVal.id IS NOT NULL AND (metaVal.toID IS NOT NULL OR metaVal.toName IS NULL))]";

    #[test]
    fn created_meta_expr_test() {
        let meta = MutationMeta::created("this0", "Movie");
        let text = render(Clause::Return(Projection::items(vec![ReturnItem::new(
            meta.to_expr(),
            "m",
        )])));
        assert_eq!(
            text,
            "RETURN { type: \"Created\", id: elementId(this0), name: \"Movie\", properties: { new: this0 { .* } }, timestamp: timestamp() } AS m"
        );
    }

    #[test]
    fn first_stage_declares_list_test() {
        let mut projector = WithProjector::new(&["this0"], true);
        let root = projector.root();
        let clause = projector.next_stage_variables(root, StageOptions::default());
        assert_eq!(render(clause), "WITH this0");
        assert!(!projector.scope(root).mutate_meta_variable_declared);

        projector.mark_mutation_meta(root, MutationMeta::deleted("this0", "Movie"));
        let text = render(projector.next_stage_variables(root, StageOptions::default()));
        assert!(text.starts_with("WITH this0, [metaVal IN [{ type: \"Deleted\""));
        assert!(text.ends_with(&format!("{FILTER} AS mutateMeta")));
        assert!(projector.scope(root).mutate_meta_variable_declared);
    }

    #[test]
    fn later_stages_append_without_duplicates_test() {
        let mut projector = WithProjector::new(&["this"], true);
        let root = projector.root();
        projector.mark_mutation_meta(root, MutationMeta::created("this", "Movie"));
        projector.mark_mutation_meta(root, MutationMeta::created("this", "Movie"));
        projector.next_stage_variables(root, StageOptions::default());

        projector.mark_mutation_meta(root, MutationMeta::deleted("this", "Movie"));
        let text = render(projector.next_stage_variables(root, StageOptions::default()));
        assert!(text.starts_with("WITH this, mutateMeta + [metaVal IN [{ type: \"Deleted\""));
        assert_eq!(text.matches("type: ").count(), 1);

        // nothing new, the list is carried as is
        let text = render(projector.next_stage_variables(root, StageOptions::default()));
        assert_eq!(text, "WITH this, mutateMeta");
    }

    #[test]
    fn child_scopes_merge_into_parent_test() {
        let mut projector = WithProjector::new(&["this"], true);
        let root = projector.root();
        let child = projector.create_child(root, "create_this1");
        assert_eq!(projector.scope(child).variables, vec!["this".to_string()]);
        assert_eq!(projector.scope(child).parent, Some(root));
        projector.add_variable(child, "this1");

        projector.mark_mutation_meta(child, MutationMeta::created("this1", "Actor"));
        let ret = projector
            .next_return(child, StageOptions { reduce_meta: true })
            .unwrap();
        let text = render(ret);
        assert!(text.starts_with("RETURN REDUCE(acc = [], m IN collect([metaVal IN"));
        assert!(text.ends_with(") AS create_this1_mutateMeta"));

        projector.merge_with_child(root, child);
        projector.mark_mutation_meta(root, MutationMeta::created("this", "Movie"));
        let text = render(projector.next_stage_variables(root, StageOptions::default()));
        assert!(text.starts_with("WITH this, [metaVal IN [{ type: \"Created\""));
        assert!(text.ends_with(" + create_this1_mutateMeta AS mutateMeta"));
    }

    #[test]
    fn surfaced_count_matches_marks_test() {
        let mut projector = WithProjector::new(&["this"], true);
        let root = projector.root();
        let mut marks = 0;
        for i in 0..3 {
            let child = projector.create_child(root, &format!("c{i}"));
            let grandchild = projector.create_child(child, &format!("g{i}"));
            for _ in 0..i + 1 {
                projector.mark_mutation_meta(grandchild, MutationMeta::created("x", "Actor"));
                marks += 1;
            }
            projector.next_return(grandchild, StageOptions { reduce_meta: true });
            projector.merge_with_child(child, grandchild);
            projector.mark_mutation_meta(child, MutationMeta::created("y", "Movie"));
            marks += 1;
            projector.next_stage_variables(child, StageOptions::default());
            projector.next_return(child, StageOptions { reduce_meta: true });
            projector.merge_with_child(root, child);
        }
        projector.mark_mutation_meta(root, MutationMeta::deleted("this", "Movie"));
        marks += 1;
        projector.next_stage_variables(root, StageOptions::default());
        projector.next_stage_variables(root, StageOptions::default());
        assert_eq!(projector.surfaced(root).len(), marks);
    }

    #[test]
    fn disabled_projector_emits_nothing_test() {
        let mut projector = WithProjector::new(&["this"], false);
        let root = projector.root();
        let child = projector.create_child(root, "c");
        projector.mark_mutation_meta(child, MutationMeta::created("this", "Movie"));
        assert!(projector.next_return(child, StageOptions::default()).is_none());
        projector.merge_with_child(root, child);
        assert_eq!(
            render(projector.next_stage_variables(root, StageOptions::default())),
            "WITH this"
        );
        assert!(projector.final_list().is_none());
        assert!(projector.surfaced(root).is_empty());
    }

    #[test]
    fn edge_meta_with_labels_test() {
        let meta = MutationMeta::connected(
            ("this", &Side::Typename("Movie".to_string())),
            ("this0", "ACTED_IN"),
            ("this1", &Side::Labels),
        );
        let text = render(Clause::Return(Projection::items(vec![ReturnItem::new(
            meta.to_expr(),
            "m",
        )])));
        assert!(text.contains("toLabels: labels(this1)"));
        assert!(text.contains("relationshipID: elementId(this0)"));
        assert!(!text.contains("toName"));
        assert_eq!(meta.kind, MetaKind::Connected);

        let detached = MutationMeta::detached("this2", "this3", "this4");
        let text = render(Clause::Return(Projection::items(vec![ReturnItem::new(
            detached.to_expr(),
            "m",
        )])));
        assert!(text.contains("labels: labels(this2)"));
        assert!(text.contains("relationshipName: type(this3)"));
        assert_eq!(detached.kind, MetaKind::Disconnected);
    }
}
