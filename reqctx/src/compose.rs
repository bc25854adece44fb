//! Type-preserving left-to-right composition of capability layers.

use reqctx_core::Ctx;

/// A capability layer: a function from one [`Ctx`] to a wrapping one.
///
/// Every `wrap`/`wrap_child` constructor in this crate (`DeadlineCtx::wrap`,
/// `OverridesCtx::wrap`, `CacheCtx::wrap`, and `reqctx-telemetry`'s
/// `TelemetryCtx::wrap`) already has this shape once its non-`Ctx`
/// arguments are bound via a closure.
pub type Layer = Box<dyn FnOnce(Ctx) -> Ctx>;

/// Applies `layers` to `base` in order, each wrapping the result of the one
/// before it.
///
/// `compose(base, [deadline, overrides, cache, telemetry])` produces
/// `telemetry(cache(overrides(deadline(base))))` — the order a request
/// actually traverses top-down is the reverse of this list, since the last
/// layer applied is the outermost one a caller's `request()` call reaches
/// first.
pub fn compose(base: Ctx, layers: impl IntoIterator<Item = Layer>) -> Ctx {
    layers.into_iter().fold(base, |ctx, layer| layer(ctx))
}
