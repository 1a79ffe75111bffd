//! In-page scripts used by the Chrome driver
//!
//! Every script that returns structured data wraps it in `JSON.stringify` so the
//! CDP round trip only ever carries a string primitive.

/// Quote `value` as a JavaScript string literal
pub(crate) fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

pub(crate) fn count(selector: &str) -> String {
    format!(
        "JSON.stringify(document.querySelectorAll({}).length)",
        js_string(selector)
    )
}

pub(crate) fn is_visible(selector: &str) -> String {
    format!(
        r#"JSON.stringify((() => {{
    const el = document.querySelector({});
    if (!el) return false;
    const style = window.getComputedStyle(el);
    if (style.display === 'none' || style.visibility === 'hidden' || style.opacity === '0') return false;
    return el.getClientRects().length > 0;
}})())"#,
        js_string(selector)
    )
}

pub(crate) fn element_boxes(selector: &str, limit: usize) -> String {
    format!(
        r#"JSON.stringify(Array.from(document.querySelectorAll({})).slice(0, {}).map(el => {{
    const r = el.getBoundingClientRect();
    return {{
        x: r.x + window.scrollX,
        y: r.y + window.scrollY,
        width: r.width,
        height: r.height,
        text: (el.textContent || '').trim().slice(0, 60),
    }};
}}))"#,
        js_string(selector),
        limit
    )
}

pub(crate) fn scroll_into_view(selector: &str) -> String {
    format!(
        r#"JSON.stringify((() => {{
    const el = document.querySelector({});
    if (!el) return false;
    el.scrollIntoView({{ block: 'start' }});
    return true;
}})())"#,
        js_string(selector)
    )
}

pub(crate) fn scroll_to(y: f64) -> String {
    format!("JSON.stringify((window.scrollTo(0, {}), true))", y)
}

pub(crate) fn computed_style(selector: &str, property: &str) -> String {
    format!(
        r#"JSON.stringify((() => {{
    const el = document.querySelector({});
    if (!el) return null;
    return window.getComputedStyle(el).getPropertyValue({});
}})())"#,
        js_string(selector),
        js_string(property)
    )
}

pub(crate) const IMAGES: &str = r#"JSON.stringify(Array.from(document.images).map(img => ({
    src: img.currentSrc || img.src || '',
    loading: img.getAttribute('loading'),
    top: img.getBoundingClientRect().top + window.scrollY,
})))"#;

pub(crate) const DOCUMENT_METRICS: &str = r#"JSON.stringify({
    scroll_width: document.documentElement.scrollWidth,
    client_width: document.documentElement.clientWidth,
    scroll_height: document.documentElement.scrollHeight,
    client_height: document.documentElement.clientHeight,
    viewport_height: window.innerHeight,
})"#;

/// Patches console methods and listens for uncaught errors. Idempotent per document.
pub(crate) const INSTALL_CAPTURE: &str = r#"JSON.stringify((() => {
    if (window.__pageprobeConsole) return true;
    const buffer = [];
    window.__pageprobeConsole = buffer;
    const render = (a) => {
        if (typeof a === 'string') return a;
        try { return JSON.stringify(a); } catch (_) { return String(a); }
    };
    const push = (kind, args) => {
        try {
            buffer.push({ kind, text: args.map(render).join(' '), timestamp_ms: Date.now() });
        } catch (_) {}
    };
    for (const kind of ['log', 'info', 'debug', 'warn', 'error']) {
        const original = console[kind];
        if (typeof original !== 'function') continue;
        console[kind] = function (...args) {
            push(kind, args);
            return original.apply(this, args);
        };
    }
    window.addEventListener('error', (e) => push('exception', [e.message || String(e)]));
    window.addEventListener('unhandledrejection', (e) => push('unhandledrejection', [String(e.reason)]));
    return true;
})())"#;

pub(crate) const TAKE_CONSOLE: &str =
    "JSON.stringify(window.__pageprobeConsole ? window.__pageprobeConsole.splice(0) : [])";

/// Resource timing entries past the last-read cursor
pub(crate) const TAKE_RESOURCES: &str = r#"JSON.stringify((() => {
    const entries = performance.getEntriesByType('resource');
    const cursor = window.__pageprobeResourceCursor || 0;
    window.__pageprobeResourceCursor = entries.length;
    return entries.slice(cursor).map(r => ({
        url: r.name,
        start_ms: r.startTime,
        duration_ms: r.duration,
        transfer_size: Math.round(r.transferSize || 0),
        status: r.responseStatus || null,
    }));
})())"#;
