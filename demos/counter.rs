//! Countdown demo.
//!
//! A `Main` component holds two state cells: a header counter that ticks up
//! every half second and a countdown that ticks down until it reaches 5,
//! then stops the scheduler. Both timers are background tasks spawned from
//! effects, reporting back through setters; their cancellation is tied to
//! the effects' cleanups.

use std::thread;
use std::time::Duration;

use ember_tui::{
    component, primitive, task, Attr, Callback, ComponentDesc, ComponentType, Element,
    EngineError, PrimitiveDesc, Props, Scheduler, Scope, TermBackend, Value,
};

const MAIN: ComponentType = ComponentType::new("Main", main_component);
const CUSTOM: ComponentType = ComponentType::new("CustomComponent", custom_component);
const HEADER: ComponentType = ComponentType::new("Header", header);

fn header(props: &Props, _scope: &mut Scope<'_>) -> Result<Element, EngineError> {
    let title = props
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    Ok(Element::Primitive(
        PrimitiveDesc::new("box", Props::new()).with_children(vec![primitive(
            "text",
            Props::new().with("content", title).with("attrs", Attr::BOLD),
        )]),
    ))
}

fn custom_component(props: &Props, _scope: &mut Scope<'_>) -> Result<Element, EngineError> {
    let count = props.get("count").and_then(Value::as_int).unwrap_or(0);
    let title = props
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let prefix = props
        .get("text_prefix")
        .and_then(Value::as_str)
        .unwrap_or("Item")
        .to_string();

    let mut children = vec![component(HEADER, Props::new().with("title", title))];
    for i in 0..count {
        children.push(primitive(
            "text",
            Props::new().with("content", format!("{prefix} {i}")),
        ));
    }
    Ok(Element::Primitive(
        PrimitiveDesc::new("box", Props::new()).with_children(children),
    ))
}

fn main_component(props: &Props, scope: &mut Scope<'_>) -> Result<Element, EngineError> {
    let (header_n, set_header) = scope.state(0i64)?;
    let (count, set_count) = scope.state(9i64)?;
    let on_done = props.get("on_done").and_then(Value::as_callback).cloned();

    scope.effect(Some(vec![count.into()]), move || {
        if count == 5 {
            if let Some(done) = &on_done {
                done.call();
            }
            None
        } else {
            let timer = task::spawn(move |token| {
                thread::sleep(Duration::from_millis(800));
                if !token.is_cancelled() {
                    set_count.update(|n| n - 1);
                }
            });
            Some(timer.cancel_on_cleanup())
        }
    })?;

    scope.effect(Some(vec![header_n.into()]), move || {
        let timer = task::spawn(move |token| {
            thread::sleep(Duration::from_millis(500));
            if !token.is_cancelled() {
                set_header.update(|n| n + 1);
            }
        });
        Some(timer.cancel_on_cleanup())
    })?;

    Ok(component(
        CUSTOM,
        Props::new()
            .with("count", count)
            .with("text_prefix", "Sample")
            .with("title", format!("Header (count: {header_n})")),
    ))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut scheduler = Scheduler::new(TermBackend::new()?);
    let handle = scheduler.handle();
    scheduler.start(ComponentDesc::new(
        MAIN,
        Props::new().with("on_done", Callback::new(move || handle.stop())),
    ))?;
    scheduler.run()?;
    scheduler.shutdown()?;
    println!("done");
    Ok(())
}
