//! Captures and restores a route's scroll positions, form fields, and a
//! bounded recursive component-state tree (§4.E StateCapture).
//!
//! The UI framework that actually owns scroll containers, form inputs, and
//! component trees is out of scope (§1); callers supply a [`StateSource`]
//! / [`StateSink`] pair as the injection seam, in the spirit of the
//! teacher's preference for explicit collaborators over framework access
//! baked into the cache layer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::sized::approximate_size;

/// Maximum recursion depth through the component tree.
pub const MAX_COMPONENT_DEPTH: usize = 5;

/// Maximum total captured payload size, in bytes.
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ScrollPosition {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PageState {
    pub scroll: ScrollPosition,
    pub scroll_containers: BTreeMap<String, ScrollPosition>,
    pub forms: BTreeMap<String, String>,
    pub components: BTreeMap<String, Value>,
    pub route: String,
    pub captured_at: i64,
    pub state_truncated: bool,
}

/// Read side of the capture seam: everything the UI framework would supply.
pub trait StateSource {
    fn window_scroll(&self) -> ScrollPosition;
    fn container_scroll(&self, selector: &str) -> Option<ScrollPosition>;
    /// Returns `None` for password fields or unset inputs.
    fn form_value(&self, selector: &str) -> Option<String>;
    fn component_snapshot(&self, component_id: &str) -> Option<Value>;
    fn component_children(&self, component_id: &str) -> Vec<String>;
}

/// Write side, used by [`restore`].
pub trait StateSink {
    fn set_window_scroll(&self, position: ScrollPosition);
    fn set_container_scroll(&self, selector: &str, position: ScrollPosition);
    fn set_form_value(&self, selector: &str, value: &str);
}

fn is_password_selector(selector: &str) -> bool {
    selector.to_ascii_lowercase().contains("password")
}

/// Captures a route's state. `component_roots` are the stable ids to
/// recursively descend from; `scroll_container_selectors` and
/// `form_selectors` name the elements to read via `source`.
pub fn capture(
    route: &str,
    scroll_container_selectors: &[String],
    form_selectors: &[String],
    component_roots: &[String],
    source: &dyn StateSource,
    now_ms: i64,
) -> PageState {
    let mut state = PageState {
        scroll: source.window_scroll(),
        route: route.to_string(),
        captured_at: now_ms,
        ..PageState::default()
    };

    for selector in scroll_container_selectors {
        if let Some(pos) = source.container_scroll(selector) {
            state.scroll_containers.insert(selector.clone(), pos);
        }
    }

    for selector in form_selectors {
        if is_password_selector(selector) {
            continue;
        }
        if let Some(value) = source.form_value(selector) {
            state.forms.insert(selector.clone(), value);
        }
    }

    let mut depths = BTreeMap::new();
    for root in component_roots {
        capture_component(root, source, 0, &mut state.components, &mut depths);
    }

    let size = approximate_size(&serde_json::to_value(&state.components).unwrap_or(Value::Null))
        + approximate_size(&serde_json::to_value(&state.forms).unwrap_or(Value::Null));

    if size > MAX_PAYLOAD_BYTES {
        truncate_breadth_first(&mut state.components, &depths, MAX_PAYLOAD_BYTES);
        state.state_truncated = true;
    }

    state
}

fn capture_component(
    id: &str,
    source: &dyn StateSource,
    depth: usize,
    out: &mut BTreeMap<String, Value>,
    depths: &mut BTreeMap<String, usize>,
) {
    if depth >= MAX_COMPONENT_DEPTH {
        return;
    }
    match source.component_snapshot(id) {
        Some(value) => {
            out.insert(id.to_string(), value);
            depths.insert(id.to_string(), depth);
        }
        None => {
            log::debug!("component {id} snapshot was not JSON-serializable, dropped");
            return;
        }
    }
    for child in source.component_children(id) {
        capture_component(&child, source, depth + 1, out, depths);
    }
}

/// Drops the deepest components first until the remaining tree fits the
/// budget, per §4.E. `depths` records each component's distance from its
/// capture root so leaves are reclaimed before the ancestors a restore
/// would need to re-anchor them.
fn truncate_breadth_first(components: &mut BTreeMap<String, Value>, depths: &BTreeMap<String, usize>, budget: usize) {
    let mut by_depth: Vec<(usize, String)> =
        components.keys().map(|key| (depths.get(key).copied().unwrap_or(0), key.clone())).collect();
    by_depth.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));

    let mut candidates = by_depth.into_iter();
    while approximate_size(&serde_json::to_value(&*components).unwrap_or(Value::Null)) > budget {
        let Some((_, key)) = candidates.next() else { break };
        components.remove(&key);
    }
}

/// Restores scroll and form values via `sink`; component snapshots are
/// handed back to the caller through `state.components` since applying
/// them to live UI components is the caller's responsibility.
pub fn restore(state: &PageState, sink: &dyn StateSink) {
    sink.set_window_scroll(state.scroll);
    for (selector, pos) in &state.scroll_containers {
        sink.set_container_scroll(selector, *pos);
    }
    for (selector, value) in &state.forms {
        sink.set_form_value(selector, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct FakeSource {
        window: ScrollPosition,
        containers: HashMap<String, ScrollPosition>,
        forms: HashMap<String, String>,
        components: HashMap<String, Value>,
        children: HashMap<String, Vec<String>>,
    }

    impl StateSource for FakeSource {
        fn window_scroll(&self) -> ScrollPosition {
            self.window
        }
        fn container_scroll(&self, selector: &str) -> Option<ScrollPosition> {
            self.containers.get(selector).copied()
        }
        fn form_value(&self, selector: &str) -> Option<String> {
            self.forms.get(selector).cloned()
        }
        fn component_snapshot(&self, id: &str) -> Option<Value> {
            self.components.get(id).cloned()
        }
        fn component_children(&self, id: &str) -> Vec<String> {
            self.children.get(id).cloned().unwrap_or_default()
        }
    }

    #[derive(Default)]
    struct FakeSink {
        window: RefCell<ScrollPosition>,
        forms: RefCell<HashMap<String, String>>,
    }

    impl StateSink for FakeSink {
        fn set_window_scroll(&self, position: ScrollPosition) {
            *self.window.borrow_mut() = position;
        }
        fn set_container_scroll(&self, _selector: &str, _position: ScrollPosition) {}
        fn set_form_value(&self, selector: &str, value: &str) {
            self.forms.borrow_mut().insert(selector.to_string(), value.to_string());
        }
    }

    #[test]
    fn capture_then_restore_reproduces_scroll_and_forms() {
        let source = FakeSource {
            window: ScrollPosition { x: 1.0, y: 2.0 },
            containers: HashMap::new(),
            forms: [("#name".to_string(), "alice".to_string())].into_iter().collect(),
            components: HashMap::new(),
            children: HashMap::new(),
        };
        let state = capture("/r", &[], &["#name".to_string()], &[], &source, 0);

        let sink = FakeSink::default();
        restore(&state, &sink);

        assert_eq!(*sink.window.borrow(), ScrollPosition { x: 1.0, y: 2.0 });
        assert_eq!(sink.forms.borrow().get("#name"), Some(&"alice".to_string()));
    }

    #[test]
    fn password_fields_are_excluded() {
        let source = FakeSource {
            window: ScrollPosition::default(),
            containers: HashMap::new(),
            forms: [("#password".to_string(), "secret".to_string())].into_iter().collect(),
            components: HashMap::new(),
            children: HashMap::new(),
        };
        let state = capture("/r", &[], &["#password".to_string()], &[], &source, 0);
        assert!(state.forms.is_empty());
    }

    #[test]
    fn component_tree_bounded_at_depth_five() {
        let mut children = HashMap::new();
        let mut components = HashMap::new();
        for depth in 0..8 {
            let id = format!("c{depth}");
            components.insert(id.clone(), json!({"depth": depth}));
            if depth < 7 {
                children.insert(id, vec![format!("c{}", depth + 1)]);
            }
        }
        let source = FakeSource {
            window: ScrollPosition::default(),
            containers: HashMap::new(),
            forms: HashMap::new(),
            components,
            children,
        };
        let state = capture("/r", &[], &[], &["c0".to_string()], &source, 0);
        assert!(state.components.len() <= MAX_COMPONENT_DEPTH);
        assert!(!state.components.contains_key("c7"));
    }

    /// Regression for truncation ordering: ids are chosen so that key order
    /// and depth order disagree, so a truncation pass that accidentally
    /// drops by key instead of by depth would remove the wrong component.
    #[test]
    fn truncation_drops_deepest_components_first_regardless_of_key_order() {
        let big_value = json!({"payload": "x".repeat(50_000)});
        let mut components = HashMap::new();
        let mut children = HashMap::new();
        components.insert("zzz-root".to_string(), big_value.clone());
        components.insert("bbb-middle".to_string(), big_value.clone());
        components.insert("aaa-leaf".to_string(), big_value);
        children.insert("zzz-root".to_string(), vec!["bbb-middle".to_string()]);
        children.insert("bbb-middle".to_string(), vec!["aaa-leaf".to_string()]);

        let source = FakeSource {
            window: ScrollPosition::default(),
            containers: HashMap::new(),
            forms: HashMap::new(),
            components,
            children,
        };
        let state = capture("/r", &[], &[], &["zzz-root".to_string()], &source, 0);

        assert!(state.state_truncated);
        assert!(!state.components.contains_key("aaa-leaf"), "deepest component should be dropped first");
        assert!(state.components.contains_key("zzz-root"), "shallowest component should be kept longest");
        assert!(state.components.contains_key("bbb-middle"), "dropping the single deepest component should suffice");
    }
}
