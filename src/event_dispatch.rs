use super::*;
use std::sync::LazyLock;

static NON_BUBBLING_EVENTS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "blur",
        "change",
        "error",
        "focus",
        "load",
        "loadend",
        "loadstart",
        "mouseenter",
        "mouseleave",
        "progress",
        "reset",
        "scroll",
        "submit",
        "unload",
        "toggle",
        "domnodeinsertedintodocument",
        "domnoderemovedfromdocument",
    ])
});

static DISABLED_SUPPRESSED_EVENTS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from(["click", "dblclick", "mousedown", "mousemove", "mouseup"])
});

fn bare_event_name(event: &str) -> String {
    let event = event.trim().to_ascii_lowercase();
    match event.strip_prefix("on") {
        Some(bare) if is_event_attribute(&event) => bare.to_string(),
        _ => event,
    }
}

/// Whether `event` (`click` or `onclick`) propagates to ancestors.
pub fn event_bubbles(event: &str) -> bool {
    !NON_BUBBLING_EVENTS.contains(bare_event_name(event).as_str())
}

/// Whether a disabled form control swallows `event`.
pub fn is_disabled_suppressed(event: &str) -> bool {
    DISABLED_SUPPRESSED_EVENTS.contains(bare_event_name(event).as_str())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DispatchPlan {
    pub(crate) event: String,
    pub(crate) handlers: Vec<HandlerId>,
    pub(crate) bubbles: bool,
}

fn handler_id_at(element: &Element, attribute: &str) -> Result<Option<HandlerId>> {
    let Some(raw) = element.attrs.get(attribute) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(|id| Some(HandlerId(id)))
        .map_err(|_| Error::InvalidHandlerId {
            attribute: attribute.to_string(),
            value: raw.clone(),
        })
}

/// Collects the handler ids an event on `target` reaches, closest first.
pub(crate) fn plan_dispatch(nodes: &Nodes, target: NodeId, event: &str) -> Result<DispatchPlan> {
    let event = normalize_event_attribute(event);
    let dom = nodes.dom();
    let prefix = nodes.attribute_prefix();
    let handler_attribute = format!("{prefix}{event}");
    let stop_attribute = format!("{handler_attribute}{STOP_PROPAGATION_SUFFIX}");
    let bubbles = event_bubbles(&event);
    let suppressed = is_disabled_suppressed(&event);

    let mut handlers = Vec::new();
    let mut cursor = Some(target);
    while let Some(node) = cursor {
        let Some(element) = dom.element(node) else {
            break;
        };
        if suppressed && element.disabled {
            break;
        }
        if let Some(id) = handler_id_at(element, &handler_attribute)? {
            handlers.push(id);
        }
        if !bubbles || element.attrs.contains_key(&stop_attribute) {
            break;
        }
        cursor = dom.parent_element(node);
    }

    if handlers.is_empty() {
        let target_ref = nodes.element_ref(target);
        return Err(Error::MissingHandler {
            event,
            element: target_ref.describe(),
            available: target_ref.handler_events(),
        });
    }

    Ok(DispatchPlan {
        event,
        handlers,
        bubbles,
    })
}

pub(crate) fn trigger(
    renderer: &Renderer,
    nodes: &Nodes,
    target: NodeId,
    event: &str,
    args: &EventArgs,
) -> Result<()> {
    let plan = plan_dispatch(nodes, target, event)?;
    let ids = plan
        .handlers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    renderer.trace_line(
        TraceCategory::Event,
        format!(
            "[event] {} target={} handlers=[{ids}] bubbles={}",
            plan.event,
            nodes.dom().describe_element(target),
            plan.bubbles
        ),
    );
    renderer.dispatch_events(&plan.handlers, args)
}
