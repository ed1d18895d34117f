//! Aggregated Retrospectives
//!
//! Merges a parent retrospective's Rose/Bud/Thorn items with those of its
//! children, tagging every item with where it came from. The view is a pure
//! projection of `(parent, children, include_children)` and is recomputed
//! from scratch whenever an input changes.
//!
//! Per category the order is: parent items in stored order, then each
//! child's items in stored order, children in the order supplied. Nothing
//! is re-sorted or deduplicated.

use crate::models::{RbtCategory, RbtItem, Retrospective};
use serde::Serialize;

/// Which retrospective an aggregated item came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemSource {
    pub retro_id: String,
    pub retro_title: String,
    pub is_child_item: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedItem {
    pub item: RbtItem,
    pub source: ItemSource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregatedView {
    pub roses: Vec<AggregatedItem>,
    pub buds: Vec<AggregatedItem>,
    pub thorns: Vec<AggregatedItem>,
}

impl AggregatedView {
    pub fn items(&self, category: RbtCategory) -> &[AggregatedItem] {
        match category {
            RbtCategory::Rose => &self.roses,
            RbtCategory::Bud => &self.buds,
            RbtCategory::Thorn => &self.thorns,
        }
    }

    fn items_mut(&mut self, category: RbtCategory) -> &mut Vec<AggregatedItem> {
        match category {
            RbtCategory::Rose => &mut self.roses,
            RbtCategory::Bud => &mut self.buds,
            RbtCategory::Thorn => &mut self.thorns,
        }
    }

    pub fn len(&self) -> usize {
        self.roses.len() + self.buds.len() + self.thorns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Project parent and children into one provenance-tagged view
///
/// With no parent the view is empty whatever the other inputs are.
pub fn aggregate(
    parent: Option<&Retrospective>,
    children: &[Retrospective],
    include_children: bool,
) -> AggregatedView {
    let mut view = AggregatedView::default();
    let Some(parent) = parent else {
        return view;
    };

    append_from(&mut view, parent, false);
    if include_children {
        for child in children {
            append_from(&mut view, child, true);
        }
    }
    view
}

fn append_from(view: &mut AggregatedView, retro: &Retrospective, is_child_item: bool) {
    for category in RbtCategory::ALL {
        let source = ItemSource {
            retro_id: retro.id.clone(),
            retro_title: retro.title.clone(),
            is_child_item,
        };
        view.items_mut(category)
            .extend(retro.items(category).iter().map(|item| AggregatedItem {
                item: item.clone(),
                source: source.clone(),
            }));
    }
}

/// Holds the aggregation inputs and keeps the view current
///
/// Every setter recomputes the whole view; there is no incremental path.
#[derive(Debug, Clone, Default)]
pub struct AggregatedRetro {
    parent: Option<Retrospective>,
    children: Vec<Retrospective>,
    include_children: bool,
    view: AggregatedView,
}

impl AggregatedRetro {
    pub fn new(parent: Option<Retrospective>, children: Vec<Retrospective>) -> Self {
        let mut aggregated = Self {
            parent,
            children,
            include_children: true,
            view: AggregatedView::default(),
        };
        aggregated.recompute();
        aggregated
    }

    pub fn view(&self) -> &AggregatedView {
        &self.view
    }

    pub fn parent(&self) -> Option<&Retrospective> {
        self.parent.as_ref()
    }

    pub fn children(&self) -> &[Retrospective] {
        &self.children
    }

    pub fn include_children(&self) -> bool {
        self.include_children
    }

    pub fn set_include_children(&mut self, include: bool) {
        self.include_children = include;
        self.recompute();
    }

    /// Flip child inclusion, returning the new setting
    pub fn toggle_children(&mut self) -> bool {
        self.set_include_children(!self.include_children);
        self.include_children
    }

    pub fn set_parent(&mut self, parent: Option<Retrospective>) {
        self.parent = parent;
        self.recompute();
    }

    pub fn set_children(&mut self, children: Vec<Retrospective>) {
        self.children = children;
        self.recompute();
    }

    fn recompute(&mut self) {
        self.view = aggregate(self.parent.as_ref(), &self.children, self.include_children);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn retro(id: &str, roses: &[&str], buds: &[&str], thorns: &[&str]) -> Retrospective {
        let items = |texts: &[&str], tag: &str| {
            texts
                .iter()
                .enumerate()
                .map(|(i, text)| json!({"id": format!("{id}-{tag}{i}"), "text": text}))
                .collect::<Vec<_>>()
        };
        serde_json::from_value(json!({
            "id": id,
            "user_id": "u1",
            "title": format!("Retro {id}"),
            "roses": items(roses, "r"),
            "buds": items(buds, "b"),
            "thorns": items(thorns, "t"),
            "created_at": "2025-04-01T09:00:00.000000Z"
        }))
        .unwrap()
    }

    #[test]
    fn test_without_parent_view_is_empty() {
        let children = vec![retro("c1", &["x"], &[], &[])];
        assert!(aggregate(None, &children, true).is_empty());
        assert!(aggregate(None, &children, false).is_empty());
    }

    #[test]
    fn test_children_excluded_yields_parent_items_only() {
        let parent = retro("p", &["sun", "food"], &["surf"], &[]);
        let children = vec![retro("c1", &["tram"], &["fado"], &["hills"])];

        let view = aggregate(Some(&parent), &children, false);

        assert_eq!(view.roses.len(), parent.roses.len());
        assert!(view.roses.iter().all(|i| !i.source.is_child_item));
        assert_eq!(view.len(), 3);
        assert!(RbtCategory::ALL
            .iter()
            .flat_map(|c| view.items(*c))
            .all(|i| !i.source.is_child_item));
    }

    #[test]
    fn test_children_included_in_supplied_order() {
        let parent = retro("p", &["sun"], &[], &[]);
        let children = vec![
            retro("c2", &["tram", "tiles"], &[], &[]),
            retro("c1", &["port"], &[], &["rain"]),
        ];

        let view = aggregate(Some(&parent), &children, true);

        let roses: Vec<(&str, &str)> = view
            .roses
            .iter()
            .map(|i| (i.item.text.as_str(), i.source.retro_id.as_str()))
            .collect();
        assert_eq!(
            roses,
            vec![("sun", "p"), ("tram", "c2"), ("tiles", "c2"), ("port", "c1")]
        );
        assert_eq!(view.thorns[0].source.retro_title, "Retro c1");
        assert!(view.thorns[0].source.is_child_item);
    }

    #[test]
    fn test_toggle_round_trip_restores_view() {
        let parent = retro("p", &["sun"], &["surf"], &["queue"]);
        let children = vec![retro("c1", &["tram"], &["fado"], &[])];
        let mut aggregated = AggregatedRetro::new(Some(parent), children);
        aggregated.set_include_children(false);
        let before = aggregated.view().clone();

        assert!(aggregated.toggle_children());
        assert_eq!(aggregated.view().len(), 5);
        assert!(!aggregated.toggle_children());

        assert_eq!(aggregated.view(), &before);
    }

    #[test]
    fn test_setting_children_recomputes() {
        let mut aggregated = AggregatedRetro::new(Some(retro("p", &["sun"], &[], &[])), Vec::new());
        assert_eq!(aggregated.view().roses.len(), 1);

        aggregated.set_children(vec![retro("c1", &["tram"], &[], &[])]);
        assert_eq!(aggregated.view().roses.len(), 2);

        aggregated.set_parent(None);
        assert!(aggregated.view().is_empty());
    }
}
