//! Check trait and the built-in check catalogue
//!
//! A check asks the page one question and answers pass or fail. Returning an
//! error means the question could not be asked; the runner records that as an
//! `error` result, except for wait-budget exhaustion, which is a `fail`.

use async_trait::async_trait;
use pageprobe_browser::{ElementBox, Observer, Session};
use pageprobe_core::{CheckKind, CheckSpec, Presence, ProbeError, Result, Visibility};
use regex::Regex;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Answer of a check that ran to completion
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    Pass { detail: String, data: Option<Value> },
    Fail { detail: String, data: Option<Value> },
}

impl CheckOutcome {
    pub fn pass(detail: impl Into<String>) -> Self {
        Self::Pass {
            detail: detail.into(),
            data: None,
        }
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        Self::Fail {
            detail: detail.into(),
            data: None,
        }
    }

    /// Pass when `ok`, otherwise fail, with the same detail either way
    pub fn from_bool(ok: bool, detail: impl Into<String>) -> Self {
        if ok {
            Self::pass(detail)
        } else {
            Self::fail(detail)
        }
    }

    pub fn with_data(self, value: Value) -> Self {
        match self {
            Self::Pass { detail, .. } => Self::Pass {
                detail,
                data: Some(value),
            },
            Self::Fail { detail, .. } => Self::Fail {
                detail,
                data: Some(value),
            },
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass { .. })
    }
}

/// What a check gets to look at
pub struct CheckContext<'a> {
    pub session: &'a Session,
    pub observer: &'a Observer,
    /// Budget for any single element wait inside the check
    pub wait_budget: Duration,
    /// Delay after UI interactions (animations, toasts)
    pub settle: Duration,
}

/// A named, independent assertion against page state
#[async_trait]
pub trait Check: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<CheckOutcome>;
}

/// Turn a configured check into a runnable one.
///
/// A spec that cannot be built (a bad regex, say) still yields a check, one
/// that errors when run, so the result list keeps one entry per configured check.
pub fn build_check(spec: &CheckSpec) -> Box<dyn Check> {
    let name = spec.resolved_name();
    match &spec.kind {
        CheckKind::Element { selector, expect } => Box::new(ElementCheck {
            name,
            selector: selector.clone(),
            expect: *expect,
        }),
        CheckKind::ChildCount {
            container,
            child,
            min,
        } => Box::new(ChildCountCheck {
            name,
            container: container.clone(),
            child: child.clone(),
            min: *min,
        }),
        CheckKind::LazyImages { require_all } => Box::new(LazyImagesCheck {
            name,
            require_all: *require_all,
        }),
        CheckKind::NoHorizontalOverflow { tolerance_px } => Box::new(OverflowCheck {
            name,
            tolerance_px: *tolerance_px,
        }),
        CheckKind::Overlay {
            trigger,
            overlay,
            dismiss_key,
        } => Box::new(OverlayCheck {
            name,
            trigger: trigger.clone(),
            overlay: overlay.clone(),
            dismiss_key: dismiss_key.clone(),
        }),
        CheckKind::TouchTargets {
            selector,
            min_width,
            min_height,
            limit,
            max_viewport_width,
        } => Box::new(TouchTargetsCheck {
            name,
            selector: selector.clone(),
            min_width: *min_width,
            min_height: *min_height,
            limit: *limit,
            max_viewport_width: *max_viewport_width,
        }),
        CheckKind::ConsoleErrors { max, pattern } => {
            let pattern = match pattern.as_deref().map(Regex::new).transpose() {
                Ok(p) => p,
                Err(e) => {
                    return Box::new(BrokenCheck {
                        name,
                        reason: format!("invalid console pattern: {}", e),
                    })
                }
            };
            Box::new(ConsoleErrorsCheck {
                name,
                max: *max,
                pattern,
            })
        }
        CheckKind::ResourceRequested { url_contains } => Box::new(ResourceRequestedCheck {
            name,
            url_contains: url_contains.clone(),
        }),
        CheckKind::StackedLayout { selector, min_dy } => Box::new(StackedLayoutCheck {
            name,
            selector: selector.clone(),
            min_dy: *min_dy,
        }),
        CheckKind::Visibility { selector, expect } => Box::new(VisibilityCheck {
            name,
            selector: selector.clone(),
            expect: *expect,
        }),
        CheckKind::MinFontSize { selector, min_px } => Box::new(MinFontSizeCheck {
            name,
            selector: selector.clone(),
            min_px: *min_px,
        }),
    }
}

/// Build every spec, preserving order
pub fn build_checks(specs: &[CheckSpec]) -> Vec<Box<dyn Check>> {
    specs.iter().map(build_check).collect()
}

/// Stand-in for a check whose configuration was unusable
struct BrokenCheck {
    name: String,
    reason: String,
}

#[async_trait]
impl Check for BrokenCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _ctx: &CheckContext<'_>) -> Result<CheckOutcome> {
        Err(ProbeError::Check {
            check: self.name.clone(),
            reason: self.reason.clone(),
        })
    }
}

pub struct ElementCheck {
    name: String,
    selector: String,
    expect: Presence,
}

#[async_trait]
impl Check for ElementCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<CheckOutcome> {
        let page = ctx.session.page();
        match self.expect {
            Presence::Present => match page.wait_for_selector(&self.selector, ctx.wait_budget).await {
                Ok(()) => Ok(CheckOutcome::pass(format!("{} found", self.selector))),
                Err(e) if e.is_timeout() => Ok(CheckOutcome::fail(format!(
                    "{} not found within {:?}",
                    self.selector, ctx.wait_budget
                ))),
                Err(e) => Err(e),
            },
            Presence::Absent => {
                let count = page.count(&self.selector).await?;
                let detail = if count == 0 {
                    format!("{} absent", self.selector)
                } else {
                    format!("{} present ({} match(es))", self.selector, count)
                };
                Ok(CheckOutcome::from_bool(count == 0, detail).with_data(json!({ "count": count })))
            }
        }
    }
}

pub struct ChildCountCheck {
    name: String,
    container: String,
    child: String,
    min: usize,
}

#[async_trait]
impl Check for ChildCountCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<CheckOutcome> {
        let page = ctx.session.page();
        page.wait_for_selector(&self.container, ctx.wait_budget).await?;

        let count = page.count(&self.child).await?;
        debug!("{}: {} match(es) for {}", self.name, count, self.child);

        Ok(CheckOutcome::from_bool(count >= self.min, count.to_string())
            .with_data(json!({ "count": count, "min": self.min })))
    }
}

pub struct LazyImagesCheck {
    name: String,
    require_all: bool,
}

#[async_trait]
impl Check for LazyImagesCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<CheckOutcome> {
        let page = ctx.session.page();
        let fold = page.document_metrics().await?.viewport_height;
        let images = page.images().await?;

        let below: Vec<_> = images.iter().filter(|img| img.top > fold).collect();
        if below.is_empty() {
            return Ok(CheckOutcome::pass("no images below the fold")
                .with_data(json!({ "images": images.len(), "below_fold": 0, "lazy": 0 })));
        }

        let lazy = below.iter().filter(|img| img.is_lazy()).count();
        let ok = if self.require_all {
            lazy == below.len()
        } else {
            lazy > 0
        };

        Ok(CheckOutcome::from_bool(
            ok,
            format!("{}/{} below-fold images lazy-loaded", lazy, below.len()),
        )
        .with_data(json!({ "images": images.len(), "below_fold": below.len(), "lazy": lazy })))
    }
}

pub struct OverflowCheck {
    name: String,
    tolerance_px: u32,
}

#[async_trait]
impl Check for OverflowCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<CheckOutcome> {
        let metrics = ctx.session.page().document_metrics().await?;
        let ok = metrics.scroll_width <= metrics.client_width + f64::from(self.tolerance_px);

        Ok(CheckOutcome::from_bool(
            ok,
            format!(
                "scrollWidth {} vs clientWidth {} (tolerance {}px)",
                metrics.scroll_width, metrics.client_width, self.tolerance_px
            ),
        )
        .with_data(json!({
            "scroll_width": metrics.scroll_width,
            "client_width": metrics.client_width,
            "overflow_px": metrics.scroll_width - metrics.client_width,
        })))
    }
}

pub struct OverlayCheck {
    name: String,
    trigger: String,
    overlay: String,
    dismiss_key: String,
}

#[async_trait]
impl Check for OverlayCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<CheckOutcome> {
        let page = ctx.session.page();

        page.click(&self.trigger).await?;
        if let Err(e) = page.wait_for_selector(&self.overlay, ctx.wait_budget).await {
            if e.is_timeout() {
                return Ok(CheckOutcome::fail(format!(
                    "{} did not open after clicking {}",
                    self.overlay, self.trigger
                )));
            }
            return Err(e);
        }
        tokio::time::sleep(ctx.settle).await;

        if !page.is_visible(&self.overlay).await? {
            return Ok(CheckOutcome::fail(format!(
                "{} present but not visible after clicking {}",
                self.overlay, self.trigger
            )));
        }

        page.press_key(&self.dismiss_key).await?;
        tokio::time::sleep(ctx.settle).await;

        let still_visible = page.is_visible(&self.overlay).await?;
        let detail = if still_visible {
            format!("{} still visible after {}", self.overlay, self.dismiss_key)
        } else {
            format!("{} opened and dismissed with {}", self.overlay, self.dismiss_key)
        };
        Ok(CheckOutcome::from_bool(!still_visible, detail))
    }
}

pub struct TouchTargetsCheck {
    name: String,
    selector: String,
    min_width: f64,
    min_height: f64,
    limit: usize,
    max_viewport_width: u32,
}

impl TouchTargetsCheck {
    fn undersized<'b>(&self, boxes: &'b [ElementBox]) -> Vec<&'b ElementBox> {
        boxes
            .iter()
            .filter(|b| b.width < self.min_width || b.height < self.min_height)
            .collect()
    }
}

#[async_trait]
impl Check for TouchTargetsCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<CheckOutcome> {
        let width = ctx.session.profile().width;
        if width > self.max_viewport_width {
            return Ok(CheckOutcome::pass(format!(
                "skipped: viewport {}px is wider than {}px",
                width, self.max_viewport_width
            )));
        }

        let boxes = ctx.session.page().element_boxes(&self.selector, self.limit).await?;
        if boxes.is_empty() {
            return Ok(CheckOutcome::pass(format!("no elements match {}", self.selector)));
        }

        let small = self.undersized(&boxes);
        let data = json!({
            "measured": boxes.len(),
            "undersized": small
                .iter()
                .map(|b| json!({ "text": b.text, "width": b.width, "height": b.height }))
                .collect::<Vec<_>>(),
        });

        if small.is_empty() {
            return Ok(CheckOutcome::pass(format!(
                "{} target(s) at least {}x{}",
                boxes.len(),
                self.min_width,
                self.min_height
            ))
            .with_data(data));
        }

        let first = small[0];
        Ok(CheckOutcome::fail(format!(
            "{} of {} target(s) smaller than {}x{} (e.g. '{}' is {}x{})",
            small.len(),
            boxes.len(),
            self.min_width,
            self.min_height,
            first.text,
            first.width,
            first.height
        ))
        .with_data(data))
    }
}

pub struct ConsoleErrorsCheck {
    name: String,
    max: usize,
    pattern: Option<Regex>,
}

#[async_trait]
impl Check for ConsoleErrorsCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<CheckOutcome> {
        ctx.observer.poll(ctx.session).await;

        let errors: Vec<String> = ctx
            .observer
            .console_errors(ctx.session.id())
            .await
            .into_iter()
            .filter(|text| self.pattern.as_ref().map_or(true, |p| p.is_match(text)))
            .collect();

        let detail = match errors.first() {
            None => "no console errors".to_string(),
            Some(first) => format!("{} console error(s), first: {}", errors.len(), first),
        };
        Ok(CheckOutcome::from_bool(errors.len() <= self.max, detail)
            .with_data(json!({ "count": errors.len(), "max": self.max })))
    }
}

pub struct ResourceRequestedCheck {
    name: String,
    url_contains: String,
}

#[async_trait]
impl Check for ResourceRequestedCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<CheckOutcome> {
        ctx.observer.poll(ctx.session).await;

        let network = ctx.observer.network(ctx.session.id()).await;
        let matching: Vec<_> = network
            .iter()
            .filter(|e| e.url.contains(&self.url_contains))
            .collect();

        match matching.first() {
            Some(hit) => Ok(CheckOutcome::pass(format!(
                "{} ({:.0}ms)",
                hit.url, hit.duration_ms
            ))
            .with_data(json!({ "matches": matching.len() }))),
            None => Ok(CheckOutcome::fail(format!(
                "no request matching '{}' among {} captured",
                self.url_contains,
                network.len()
            ))),
        }
    }
}

pub struct StackedLayoutCheck {
    name: String,
    selector: String,
    min_dy: f64,
}

#[async_trait]
impl Check for StackedLayoutCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<CheckOutcome> {
        let boxes = ctx.session.page().element_boxes(&self.selector, 2).await?;
        if boxes.len() < 2 {
            return Ok(CheckOutcome::fail(format!(
                "need two matches for {}, found {}",
                self.selector,
                boxes.len()
            )));
        }

        let dy = boxes[1].y - boxes[0].y;
        Ok(CheckOutcome::from_bool(
            dy > self.min_dy,
            format!("second item {}px below the first (need > {})", dy, self.min_dy),
        )
        .with_data(json!({ "dy": dy })))
    }
}

pub struct VisibilityCheck {
    name: String,
    selector: String,
    expect: Visibility,
}

#[async_trait]
impl Check for VisibilityCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<CheckOutcome> {
        let page = ctx.session.page();
        if page.count(&self.selector).await? == 0 {
            return Ok(CheckOutcome::fail(format!("no element matches {}", self.selector)));
        }

        let visible = page.is_visible(&self.selector).await?;
        let ok = match self.expect {
            Visibility::Visible => visible,
            Visibility::Hidden => !visible,
        };
        let state = if visible { "visible" } else { "hidden" };

        Ok(CheckOutcome::from_bool(
            ok,
            format!("{} is {} on {}", self.selector, state, ctx.session.profile().name),
        )
        .with_data(json!({ "visible": visible })))
    }
}

pub struct MinFontSizeCheck {
    name: String,
    selector: String,
    min_px: f64,
}

#[async_trait]
impl Check for MinFontSizeCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<CheckOutcome> {
        let Some(raw) = ctx
            .session
            .page()
            .computed_style(&self.selector, "font-size")
            .await?
        else {
            return Ok(CheckOutcome::fail(format!("no element matches {}", self.selector)));
        };

        let Some(px) = parse_px(&raw) else {
            return Err(ProbeError::Check {
                check: self.name.clone(),
                reason: format!("unreadable font-size '{}' on {}", raw, self.selector),
            });
        };

        Ok(CheckOutcome::from_bool(
            px >= self.min_px,
            format!("{} font-size {}px (min {}px)", self.selector, px, self.min_px),
        )
        .with_data(json!({ "font_size_px": px, "min_px": self.min_px })))
    }
}

/// Computed lengths always come back in `px`
fn parse_px(value: &str) -> Option<f64> {
    value.trim().strip_suffix("px")?.trim().parse().ok()
}
