//! In-page helpers shared by every backend.
//!
//! Each script is an expression that evaluates to a JSON object. The
//! argument is injected as `__arg` before the body runs.

use serde::Deserialize;
use serde_json::Value;

use crate::{Error, Result};

/// Element lookup. Locators arrive in their serialized form
/// (`{"id": ..}`, `{"xpath": ..}`, `{"nth": {"parent": .., "index": ..}}`).
const FIND: &str = r#"
const __visible = (el) => {
    if (!el || !el.isConnected) return false;
    const style = window.getComputedStyle(el);
    if (style.display === 'none' || style.visibility === 'hidden') return false;
    const rect = el.getBoundingClientRect();
    return rect.width > 0 && rect.height > 0;
};
const __pick = (list) => list.find(__visible) || list[0] || null;
const __norm = (s) => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
const __find = (loc) => {
    if (loc.id !== undefined) return document.getElementById(loc.id);
    if (loc.css !== undefined) return __pick(Array.from(document.querySelectorAll(loc.css)));
    if (loc.xpath !== undefined) {
        const snap = document.evaluate(loc.xpath, document, null,
            XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
        const list = [];
        for (let i = 0; i < snap.snapshotLength; i++) {
            const node = snap.snapshotItem(i);
            if (node.nodeType === Node.ELEMENT_NODE) list.push(node);
        }
        return __pick(list);
    }
    if (loc.text !== undefined) {
        const needle = __norm(loc.text);
        if (!document.body) return null;
        const hits = Array.from(document.body.querySelectorAll('*'))
            .filter((el) => __norm(el.textContent).includes(needle));
        const leaves = hits.filter((el) =>
            !Array.from(el.children).some((c) => __norm(c.textContent).includes(needle)));
        return __pick(leaves);
    }
    if (loc.nth !== undefined) {
        const parent = __find(loc.nth.parent);
        return parent ? (parent.children[loc.nth.index] || null) : null;
    }
    return null;
};
"#;

pub(crate) const PROBE: &str = r#"
const el = __find(__arg.locator);
if (!el) return { attached: false, visible: false, enabled: false, children: 0 };
const visible = __visible(el);
const disabled = el.disabled === true || el.getAttribute('aria-disabled') === 'true';
const children = el instanceof HTMLSelectElement ? el.options.length : el.children.length;
return { attached: true, visible, enabled: visible && !disabled, children };
"#;

pub(crate) const CLICK: &str = r#"
const el = __find(__arg.locator);
if (!el) return { ok: false, error: 'not_found' };
el.scrollIntoView({ block: 'center', inline: 'center' });
el.click();
if (__arg.double) {
    el.click();
    el.dispatchEvent(new MouseEvent('dblclick', { bubbles: true, cancelable: true, view: window }));
}
return { ok: true };
"#;

/// Viewport center of the element, for backends that click natively.
pub(crate) const POINT: &str = r#"
const el = __find(__arg.locator);
if (!el) return { ok: false, error: 'not_found' };
el.scrollIntoView({ block: 'center', inline: 'center' });
const rect = el.getBoundingClientRect();
if (!__visible(el)) return { ok: false, error: 'element is not visible' };
return { ok: true, point: [rect.left + rect.width / 2, rect.top + rect.height / 2] };
"#;

pub(crate) const FILL: &str = r#"
const el = __find(__arg.locator);
if (!el) return { ok: false, error: 'not_found' };
el.scrollIntoView({ block: 'center' });
el.focus();
const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype
    : el instanceof HTMLInputElement ? HTMLInputElement.prototype : null;
const desc = proto && Object.getOwnPropertyDescriptor(proto, 'value');
if (desc && desc.set) desc.set.call(el, __arg.value); else el.value = __arg.value;
el.dispatchEvent(new Event('input', { bubbles: true }));
el.dispatchEvent(new Event('change', { bubbles: true }));
return { ok: true };
"#;

pub(crate) const SELECT: &str = r#"
const el = __find(__arg.locator);
if (!el) return { ok: false, error: 'not_found' };
if (!(el instanceof HTMLSelectElement)) return { ok: false, error: 'element is not a <select>' };
const opts = Array.from(el.options);
const c = __arg.choice;
let idx = -1;
if (c.index !== undefined) idx = c.index < opts.length ? c.index : -1;
else if (c.value !== undefined) idx = opts.findIndex((o) => o.value === c.value);
else if (c.label !== undefined) idx = opts.findIndex((o) => __norm(o.text) === __norm(c.label));
if (idx < 0) return { ok: false, error: 'no matching option among ' + opts.length };
el.selectedIndex = idx;
el.dispatchEvent(new Event('input', { bubbles: true }));
el.dispatchEvent(new Event('change', { bubbles: true }));
return { ok: true, label: opts[idx].text.trim() };
"#;

pub(crate) const LOAD_STATE: &str = r#"
return {
    ready: document.readyState,
    resources: performance.getEntriesByType('resource').length,
};
"#;

/// Wrap `body` with the finder library and its argument.
pub(crate) fn build(body: &str, arg: &Value) -> String {
    format!(
        "(() => {{\nconst __arg = {};\n{}\n{}\n}})()",
        arg, FIND, body
    )
}

/// Outcome of an interaction script.
#[derive(Debug, Deserialize)]
pub(crate) struct Outcome {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub point: Option<[f64; 2]>,
}

impl Outcome {
    /// Turn a script result into an error naming `subject` when it failed.
    pub fn check(value: Value, subject: &str) -> Result<Self> {
        let outcome: Outcome = serde_json::from_value(value)?;
        if outcome.ok {
            return Ok(outcome);
        }
        match outcome.error.as_deref() {
            Some("not_found") | None => Err(Error::ElementNotFound(subject.to_string())),
            Some(other) => Err(Error::ActionFailed(format!("{}: {}", subject, other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_injects_argument() {
        let js = build(CLICK, &json!({ "locator": { "id": "send" }, "double": false }));
        assert!(js.starts_with("(() => {"));
        assert!(js.ends_with("})()"));
        assert!(js.contains(r#"const __arg = {"double":false,"locator":{"id":"send"}};"#));
        assert!(js.contains("const __find"));
    }

    #[test]
    fn test_outcome_not_found() {
        let err = Outcome::check(json!({ "ok": false, "error": "not_found" }), "id=send")
            .unwrap_err();
        assert!(matches!(err, Error::ElementNotFound(ref s) if s == "id=send"));
    }

    #[test]
    fn test_outcome_other_failure() {
        let err = Outcome::check(
            json!({ "ok": false, "error": "element is not a <select>" }),
            "id=mes",
        )
        .unwrap_err();
        assert!(matches!(err, Error::ActionFailed(_)));
    }

    #[test]
    fn test_outcome_point() {
        let outcome =
            Outcome::check(json!({ "ok": true, "point": [120.5, 40.0] }), "id=send").unwrap();
        assert_eq!(outcome.point, Some([120.5, 40.0]));
    }

    #[test]
    fn test_outcome_label() {
        let outcome = Outcome::check(json!({ "ok": true, "label": "Mayo" }), "id=mes").unwrap();
        assert_eq!(outcome.label.as_deref(), Some("Mayo"));
    }
}
