//! Timer bindings backed by the execution's [`EventLoop`].

use std::time::Duration;

use rquickjs::function::{Opt, Rest};
use rquickjs::{Ctx, Function, Value};

use super::event_loop::EventLoop;

pub(crate) struct Timers<'js> {
    pub set_timeout: Function<'js>,
    pub set_interval: Function<'js>,
    pub clear_timeout: Function<'js>,
    pub clear_interval: Function<'js>,
    pub set_immediate: Function<'js>,
    pub clear_immediate: Function<'js>,
}

/// Milliseconds from a script-supplied delay; anything that is not a
/// positive finite number is zero.
fn delay_of(delay: Option<Value<'_>>) -> Duration {
    let ms = delay.and_then(|v| v.as_number()).unwrap_or(0.0);
    if ms.is_finite() && ms > 0.0 {
        Duration::from_secs_f64(ms / 1000.0)
    } else {
        Duration::ZERO
    }
}

fn timer_id(id: Option<Value<'_>>) -> Option<u32> {
    let id = id?.as_number()?;
    (id.is_finite() && id >= 0.0 && id <= f64::from(u32::MAX)).then_some(id as u32)
}

fn setter<'js>(ctx: &Ctx<'js>, events: &EventLoop, name: &str, repeat: bool) -> rquickjs::Result<Function<'js>> {
    let events = events.clone();
    Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, callback: Function<'js>, delay: Opt<Value<'js>>, args: Rest<Value<'js>>| {
            events.schedule(&ctx, callback, delay_of(delay.0), repeat, args.0)
        },
    )?
    .with_name(name)
}

fn clearer<'js>(ctx: &Ctx<'js>, events: &EventLoop, name: &str) -> rquickjs::Result<Function<'js>> {
    let events = events.clone();
    Function::new(ctx.clone(), move |id: Opt<Value<'js>>| {
        if let Some(id) = timer_id(id.0) {
            events.cancel(id);
        }
    })?
    .with_name(name)
}

pub(crate) fn install<'js>(ctx: &Ctx<'js>, events: &EventLoop) -> rquickjs::Result<Timers<'js>> {
    let immediate_events = events.clone();
    let set_immediate = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, callback: Function<'js>, args: Rest<Value<'js>>| {
            immediate_events.schedule(&ctx, callback, Duration::ZERO, false, args.0)
        },
    )?
    .with_name("setImmediate")?;

    Ok(Timers {
        set_timeout: setter(ctx, events, "setTimeout", false)?,
        set_interval: setter(ctx, events, "setInterval", true)?,
        clear_timeout: clearer(ctx, events, "clearTimeout")?,
        clear_interval: clearer(ctx, events, "clearInterval")?,
        set_immediate,
        clear_immediate: clearer(ctx, events, "clearImmediate")?,
    })
}
