use super::*;
use std::any::TypeId;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::Condvar;
use std::thread::{self, ThreadId};

struct ComponentNode {
    parent: Option<ComponentId>,
    /// `None` while the instance is lent out to a render or handler call.
    instance: Option<Box<dyn AnyComponent>>,
    type_id: TypeId,
    type_name: &'static str,
    children: Vec<ComponentId>,
    handlers: Vec<HandlerId>,
}

struct RegisteredHandler {
    owner: ComponentId,
    event: String,
    callback: EventCallback,
}

#[derive(Default)]
struct RendererState {
    nodes: Vec<Option<ComponentNode>>,
    roots: Vec<ComponentId>,
    /// Frames as of the last published batch. Readers outside the dispatch
    /// queue only ever see this table.
    published: HashMap<ComponentId, Arc<Vec<Frame>>>,
    handlers: HashMap<HandlerId, RegisteredHandler>,
    next_handler_id: u64,
    next_batch: u64,
    completed: bool,
}

struct CommitContext {
    owner: ComponentId,
    old_children: Vec<ComponentId>,
    reused: HashSet<ComponentId>,
    new_children: Vec<ComponentId>,
    handlers: Vec<HandlerId>,
    next_ordinal: usize,
    failure: Option<(ComponentId, String)>,
}

impl RendererState {
    fn node(&self, id: ComponentId) -> Option<&ComponentNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: ComponentId) -> Option<&mut ComponentNode> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    fn create_node(
        &mut self,
        parent: Option<ComponentId>,
        instance: Box<dyn AnyComponent>,
    ) -> ComponentId {
        let id = ComponentId(self.nodes.len());
        self.nodes.push(Some(ComponentNode {
            parent,
            type_id: instance.component_type(),
            type_name: instance.type_name(),
            instance: Some(instance),
            children: Vec::new(),
            handlers: Vec::new(),
        }));
        id
    }

    fn ancestors(&self, id: ComponentId) -> Vec<ComponentId> {
        let mut out = Vec::new();
        let mut cursor = self.node(id).and_then(|node| node.parent);
        while let Some(current) = cursor {
            out.push(current);
            cursor = self.node(current).and_then(|node| node.parent);
        }
        out
    }

    fn allocate_handler(&mut self) -> HandlerId {
        self.next_handler_id += 1;
        HandlerId(self.next_handler_id)
    }

    /// Replaces the frames of `owner` with `pending`, returning the child
    /// components that must render next.
    fn commit(
        &mut self,
        owner: ComponentId,
        pending: Vec<PendingFrame>,
        batch: &mut RenderBatch,
    ) -> Result<Vec<ComponentId>> {
        let Some(node) = self.node_mut(owner) else {
            return Ok(Vec::new());
        };
        let retired = std::mem::take(&mut node.handlers);
        let old_children = std::mem::take(&mut node.children);
        for handler in retired {
            self.handlers.remove(&handler);
        }

        let mut ctx = CommitContext {
            owner,
            old_children,
            reused: HashSet::new(),
            new_children: Vec::new(),
            handlers: Vec::new(),
            next_ordinal: 0,
            failure: None,
        };
        let frames = self.commit_frames(&mut ctx, pending);

        let stale = ctx
            .old_children
            .iter()
            .copied()
            .filter(|child| !ctx.reused.contains(child))
            .collect::<Vec<_>>();
        if !stale.is_empty() {
            let mut ancestors = vec![owner];
            ancestors.extend(self.ancestors(owner));
            for child in stale {
                self.dispose_subtree(child, ancestors.clone(), batch);
            }
        }

        let ancestors = self.ancestors(owner);
        let frames = Arc::new(frames);
        if let Some(node) = self.node_mut(owner) {
            node.children = ctx.new_children.clone();
            node.handlers = ctx.handlers;
        }
        batch
            .updated
            .insert(owner, UpdatedComponent { frames, ancestors });

        if let Some((component, message)) = ctx.failure {
            return Err(Error::RenderPanicked { component, message });
        }
        Ok(ctx.new_children)
    }

    fn commit_frames(&mut self, ctx: &mut CommitContext, pending: Vec<PendingFrame>) -> Vec<Frame> {
        let mut out = Vec::with_capacity(pending.len());
        for frame in pending {
            let frame = match frame {
                PendingFrame::Element {
                    name,
                    attributes,
                    children,
                } => {
                    let attributes = self.commit_attributes(ctx, attributes);
                    let children = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW, || {
                        self.commit_frames(ctx, children)
                    });
                    Frame::Element(ElementFrame {
                        name,
                        attributes,
                        children,
                    })
                }
                PendingFrame::Text(text) => Frame::Text(text),
                PendingFrame::Markup(markup) => Frame::Markup(markup),
                PendingFrame::Component(instance) => {
                    Frame::Component(self.adopt_child(ctx, instance))
                }
            };
            out.push(frame);
        }
        out
    }

    fn commit_attributes(
        &mut self,
        ctx: &mut CommitContext,
        pending: Vec<PendingAttribute>,
    ) -> Vec<FrameAttribute> {
        let mut out: Vec<FrameAttribute> = Vec::with_capacity(pending.len());
        for attribute in pending {
            match attribute {
                PendingAttribute::Value { name, value } => {
                    out.retain(|existing| !matches!(existing, FrameAttribute::Value { name: n, .. } | FrameAttribute::Flag { name: n } if *n == name));
                    out.push(FrameAttribute::Value { name, value });
                }
                PendingAttribute::Flag { name, on } => {
                    out.retain(|existing| !matches!(existing, FrameAttribute::Value { name: n, .. } | FrameAttribute::Flag { name: n } if *n == name));
                    if on {
                        out.push(FrameAttribute::Flag { name });
                    }
                }
                PendingAttribute::Handler { event, callback } => {
                    // A later registration for the same event wins.
                    if let Some(pos) = out.iter().position(|existing| {
                        matches!(existing, FrameAttribute::Handler { event: e, .. } if *e == event)
                    }) {
                        if let FrameAttribute::Handler { id, .. } = out.remove(pos) {
                            self.handlers.remove(&id);
                            ctx.handlers.retain(|handler| *handler != id);
                        }
                    }
                    let id = self.allocate_handler();
                    self.handlers.insert(
                        id,
                        RegisteredHandler {
                            owner: ctx.owner,
                            event: event.clone(),
                            callback,
                        },
                    );
                    ctx.handlers.push(id);
                    out.push(FrameAttribute::Handler { event, id });
                }
                PendingAttribute::StopPropagation { event, on } => {
                    out.retain(|existing| {
                        !matches!(existing, FrameAttribute::StopPropagation { event: e } if *e == event)
                    });
                    if on {
                        out.push(FrameAttribute::StopPropagation { event });
                    }
                }
            }
        }
        out
    }

    /// Children are matched to the previous render by ordinal position and type.
    fn adopt_child(&mut self, ctx: &mut CommitContext, instance: Box<dyn AnyComponent>) -> ComponentId {
        let ordinal = ctx.next_ordinal;
        ctx.next_ordinal += 1;

        let reusable = ctx.old_children.get(ordinal).copied().filter(|old| {
            !ctx.reused.contains(old)
                && self
                    .node(*old)
                    .is_some_and(|node| node.type_id == instance.component_type())
        });

        let child = match reusable {
            Some(existing) => {
                ctx.reused.insert(existing);
                if let Some(current) = self
                    .node_mut(existing)
                    .and_then(|node| node.instance.as_mut())
                {
                    let applied =
                        catch_unwind(AssertUnwindSafe(|| current.apply_parameters(instance)));
                    if let Err(payload) = applied {
                        if ctx.failure.is_none() {
                            ctx.failure = Some((existing, panic_message(payload.as_ref())));
                        }
                    }
                }
                existing
            }
            None => self.create_node(Some(ctx.owner), instance),
        };
        ctx.new_children.push(child);
        child
    }

    fn dispose_subtree(
        &mut self,
        id: ComponentId,
        ancestors: Vec<ComponentId>,
        batch: &mut RenderBatch,
    ) {
        let Some(node) = self.nodes.get_mut(id.0).and_then(Option::take) else {
            return;
        };
        for handler in &node.handlers {
            self.handlers.remove(handler);
        }
        batch.updated.remove(&id);
        let mut child_ancestors = vec![id];
        child_ancestors.extend(ancestors.iter().copied());
        batch.disposed.insert(id, ancestors);
        for child in node.children {
            stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW, || {
                self.dispose_subtree(child, child_ancestors.clone(), batch)
            });
        }
    }

    fn write_frames(&self, frames: &[Frame], prefix: &str, out: &mut String) {
        for frame in frames {
            match frame {
                Frame::Element(element) => {
                    out.push('<');
                    out.push_str(&element.name);
                    for attribute in &element.attributes {
                        out.push(' ');
                        match attribute {
                            FrameAttribute::Value { name, value } => {
                                out.push_str(name);
                                out.push_str("=\"");
                                out.push_str(&escape_html_attr_for_serialization(value));
                                out.push('"');
                            }
                            FrameAttribute::Flag { name } => out.push_str(name),
                            FrameAttribute::Handler { event, id } => {
                                out.push_str(prefix);
                                out.push_str(event);
                                out.push_str("=\"");
                                out.push_str(&id.to_string());
                                out.push('"');
                            }
                            FrameAttribute::StopPropagation { event } => {
                                out.push_str(prefix);
                                out.push_str(event);
                                out.push_str(STOP_PROPAGATION_SUFFIX);
                            }
                        }
                    }
                    out.push('>');
                    if is_void_tag(&element.name) {
                        continue;
                    }
                    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW, || {
                        self.write_frames(&element.children, prefix, out)
                    });
                    out.push_str("</");
                    out.push_str(&element.name);
                    out.push('>');
                }
                Frame::Text(text) => out.push_str(&escape_html_text_for_serialization(text)),
                Frame::Markup(markup) => out.push_str(markup),
                Frame::Component(child) => match self.published.get(child) {
                    Some(frames) => stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW, || {
                        self.write_frames(frames, prefix, out)
                    }),
                    None => tracing::debug!("skipping frames of unknown component {child}"),
                },
            }
        }
    }

    /// Makes the frames of `batch` visible to readers in one step.
    fn swap_in(&mut self, batch: &RenderBatch) {
        for (component, update) in &batch.updated {
            self.published.insert(*component, Arc::clone(&update.frames));
        }
        for component in batch.disposed.keys() {
            self.published.remove(component);
        }
    }

    fn collect_descendants(&self, root: ComponentId, out: &mut Vec<ComponentId>) {
        let Some(node) = self.node(root) else {
            return;
        };
        for child in &node.children {
            out.push(*child);
            self.collect_descendants(*child, out);
        }
    }
}

/// Serializes submissions: one thread at a time owns the renderer.
struct DispatchQueue {
    owner: Mutex<Option<ThreadId>>,
    idle: Condvar,
}

struct QueueTurn<'a> {
    queue: &'a DispatchQueue,
}

impl DispatchQueue {
    fn new() -> Self {
        Self {
            owner: Mutex::new(None),
            idle: Condvar::new(),
        }
    }

    fn enter(&self) -> Result<QueueTurn<'_>> {
        let me = thread::current().id();
        let mut owner = lock(&self.owner);
        loop {
            match *owner {
                None => break,
                Some(current) if current == me => return Err(Error::ReentrantDispatch),
                Some(_) => {
                    owner = self
                        .idle
                        .wait(owner)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
        *owner = Some(me);
        Ok(QueueTurn { queue: self })
    }
}

impl Drop for QueueTurn<'_> {
    fn drop(&mut self) {
        *lock(&self.queue.owner) = None;
        self.queue.idle.notify_one();
    }
}

struct RendererInner {
    state: Mutex<RendererState>,
    queue: DispatchQueue,
    bus: RenderEventBus,
    options: RendererOptions,
    trace: Mutex<TraceState>,
}

impl Drop for RendererInner {
    fn drop(&mut self) {
        self.bus.complete();
    }
}

/// Single owner of a component tree.
///
/// Cloning a `Renderer` yields another handle to the same tree. All mutation
/// and event dispatch is serialized; every call returns only after the
/// resulting render batches were delivered to all bus subscribers.
#[derive(Clone)]
pub struct Renderer {
    inner: Arc<RendererInner>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("Renderer")
            .field("roots", &state.roots)
            .field("handlers", &state.handlers.len())
            .field("batches", &state.next_batch)
            .field("completed", &state.completed)
            .finish()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self::with_options(RendererOptions::default())
    }

    pub fn with_options(options: RendererOptions) -> Self {
        let trace = options.trace_state();
        Self {
            inner: Arc::new(RendererInner {
                state: Mutex::new(RendererState::default()),
                queue: DispatchQueue::new(),
                bus: RenderEventBus::new(),
                options,
                trace: Mutex::new(trace),
            }),
        }
    }

    pub fn options(&self) -> &RendererOptions {
        &self.inner.options
    }

    pub fn event_bus(&self) -> &RenderEventBus {
        &self.inner.bus
    }

    /// Attaches `component` as a new root and renders it synchronously.
    pub fn attach_root<C: Component>(&self, component: C) -> Result<ComponentId> {
        let _turn = self.inner.queue.enter()?;
        let id = {
            let mut state = lock(&self.inner.state);
            if state.completed {
                return Err(Error::PostCompletionUsage);
            }
            let id = state.create_node(None, Box::new(component));
            state.roots.push(id);
            id
        };

        let mut batch = RenderBatch::default();
        let rendered = self.render_component(id, &mut batch);
        let published = self.publish(batch);
        rendered?;
        published?;
        Ok(id)
    }

    /// Attaches `component` and wraps it in a fragment for assertions.
    pub fn render<C: Component>(&self, component: C) -> Result<RenderedComponent<C>> {
        let id = self.attach_root(component)?;
        RenderedComponent::attach(self.clone(), id)
    }

    pub fn dispatch_event(&self, handler: HandlerId, args: EventArgs) -> Result<()> {
        self.dispatch_events(&[handler], &args)
    }

    /// Runs every handler in `handlers` in order. All ids are resolved before
    /// the first one runs, so an unknown id dispatches nothing.
    pub fn dispatch_events(&self, handlers: &[HandlerId], args: &EventArgs) -> Result<()> {
        let _turn = self.inner.queue.enter()?;
        let resolved = {
            let state = lock(&self.inner.state);
            if state.completed {
                return Err(Error::PostCompletionUsage);
            }
            handlers
                .iter()
                .map(|id| {
                    state
                        .handlers
                        .get(id)
                        .map(|handler| {
                            (
                                *id,
                                handler.owner,
                                handler.event.clone(),
                                Arc::clone(&handler.callback),
                            )
                        })
                        .ok_or(Error::UnknownHandler(*id))
                })
                .collect::<Result<Vec<_>>>()?
        };

        for (handler_id, owner, event, callback) in resolved {
            self.invoke_handler(handler_id, owner, &event, callback, args)?;
        }
        Ok(())
    }

    fn invoke_handler(
        &self,
        handler_id: HandlerId,
        owner: ComponentId,
        event: &str,
        callback: EventCallback,
        args: &EventArgs,
    ) -> Result<()> {
        let lent = lock(&self.inner.state)
            .node_mut(owner)
            .and_then(|node| node.instance.take());
        let Some(mut instance) = lent else {
            self.trace_line(
                TraceCategory::Event,
                format!("[event] {event} handler={handler_id} skipped: owner {owner} is gone"),
            );
            return Ok(());
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            (*callback)(instance.as_any_mut(), args)
        }));
        if let Some(node) = lock(&self.inner.state).node_mut(owner) {
            node.instance = Some(instance);
        }

        match outcome {
            Err(payload) => {
                return Err(Error::HandlerPanicked {
                    handler_id,
                    message: panic_message(payload.as_ref()),
                });
            }
            Ok(Err(source)) => return Err(Error::Handler { handler_id, source }),
            Ok(Ok(())) => {}
        }

        let mut batch = RenderBatch::default();
        let rendered = self.render_component(owner, &mut batch);
        let published = self.publish(batch);
        rendered?;
        published
    }

    /// Mutates a live component on the dispatcher, then re-renders it.
    pub fn invoke<C: Component, R>(
        &self,
        component: ComponentId,
        action: impl FnOnce(&mut C) -> R,
    ) -> Result<R> {
        let _turn = self.inner.queue.enter()?;
        if lock(&self.inner.state).completed {
            return Err(Error::PostCompletionUsage);
        }
        let result = self.with_lent_instance(component, action)?;

        let mut batch = RenderBatch::default();
        let rendered = self.render_component(component, &mut batch);
        let published = self.publish(batch);
        rendered?;
        published?;
        Ok(result)
    }

    /// Reads a live component instance without re-rendering it.
    pub fn with_component<C: Component, R>(
        &self,
        component: ComponentId,
        read: impl FnOnce(&C) -> R,
    ) -> Result<R> {
        let _turn = self.inner.queue.enter()?;
        self.with_lent_instance(component, |instance: &mut C| read(instance))
    }

    fn with_lent_instance<C: Component, R>(
        &self,
        component: ComponentId,
        action: impl FnOnce(&mut C) -> R,
    ) -> Result<R> {
        let mut instance = {
            let mut state = lock(&self.inner.state);
            let node = state
                .node_mut(component)
                .ok_or(Error::UnknownComponentId(component))?;
            if node.type_id != TypeId::of::<C>() {
                return Err(Error::TypeMismatch {
                    component,
                    expected: std::any::type_name::<C>(),
                    actual: node.type_name,
                });
            }
            node.instance
                .take()
                .ok_or(Error::UnknownComponentId(component))?
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            instance.as_any_mut().downcast_mut::<C>().map(action)
        }));
        if let Some(node) = lock(&self.inner.state).node_mut(component) {
            node.instance = Some(instance);
        }
        match outcome {
            Ok(Some(result)) => Ok(result),
            Ok(None) => Err(Error::TypeMismatch {
                component,
                expected: std::any::type_name::<C>(),
                actual: "unknown",
            }),
            Err(payload) => resume_unwind(payload),
        }
    }

    /// Disposes a root and its subtree; fragments over it become disposed.
    pub fn remove_root(&self, root: ComponentId) -> Result<()> {
        let _turn = self.inner.queue.enter()?;
        let mut batch = RenderBatch::default();
        {
            let mut state = lock(&self.inner.state);
            if state.completed {
                return Err(Error::PostCompletionUsage);
            }
            let Some(pos) = state.roots.iter().position(|id| *id == root) else {
                return Err(Error::UnknownComponentId(root));
            };
            state.roots.remove(pos);
            state.dispose_subtree(root, Vec::new(), &mut batch);
        }
        self.publish(batch)
    }

    /// Disposes every root and completes the event bus. Later submissions
    /// fail with [`Error::PostCompletionUsage`].
    pub fn dispose(&self) -> Result<()> {
        let _turn = self.inner.queue.enter()?;
        let mut batch = RenderBatch::default();
        {
            let mut state = lock(&self.inner.state);
            if state.completed {
                return Ok(());
            }
            for root in std::mem::take(&mut state.roots) {
                state.dispose_subtree(root, Vec::new(), &mut batch);
            }
        }
        let published = self.publish(batch);
        lock(&self.inner.state).completed = true;
        self.inner.bus.complete();
        published
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.inner.state).completed
    }

    /// Frames of `component` as of the last published batch; an id that is
    /// no longer tracked (for example during teardown) yields an empty list.
    pub fn frames(&self, component: ComponentId) -> Arc<Vec<Frame>> {
        let state = lock(&self.inner.state);
        match state.published.get(&component) {
            Some(frames) => Arc::clone(frames),
            None => {
                tracing::debug!("frames requested for unknown component {component}");
                Arc::new(Vec::new())
            }
        }
    }

    pub fn roots(&self) -> Vec<ComponentId> {
        lock(&self.inner.state).roots.clone()
    }

    pub fn parent_of(&self, component: ComponentId) -> Option<ComponentId> {
        lock(&self.inner.state)
            .node(component)
            .and_then(|node| node.parent)
    }

    pub fn contains(&self, component: ComponentId) -> bool {
        lock(&self.inner.state).node(component).is_some()
    }

    pub fn handler_count(&self) -> usize {
        lock(&self.inner.state).handlers.len()
    }

    /// Descendants of `root` (excluding `root`) whose type is `C`, depth first.
    pub fn find_components<C: Component>(&self, root: ComponentId) -> Vec<ComponentId> {
        let state = lock(&self.inner.state);
        let mut all = Vec::new();
        state.collect_descendants(root, &mut all);
        all.into_iter()
            .filter(|id| {
                state
                    .node(*id)
                    .is_some_and(|node| node.type_id == TypeId::of::<C>())
            })
            .collect()
    }

    pub(crate) fn markup_of(&self, component: ComponentId) -> String {
        let state = lock(&self.inner.state);
        let mut out = String::new();
        if let Some(frames) = state.published.get(&component) {
            state.write_frames(frames, &self.inner.options.attribute_prefix, &mut out);
        }
        out
    }

    fn render_component(&self, component: ComponentId, batch: &mut RenderBatch) -> Result<()> {
        let lent = lock(&self.inner.state)
            .node_mut(component)
            .and_then(|node| node.instance.take());
        let Some(instance) = lent else {
            return Ok(());
        };

        let rendered = catch_unwind(AssertUnwindSafe(|| instance.render_pending()));
        let children = {
            let mut state = lock(&self.inner.state);
            if let Some(node) = state.node_mut(component) {
                node.instance = Some(instance);
            }
            let pending = match rendered {
                Ok(pending) => pending,
                Err(payload) => {
                    return Err(Error::RenderPanicked {
                        component,
                        message: panic_message(payload.as_ref()),
                    });
                }
            };
            state.commit(component, pending, batch)?
        };

        for child in children {
            stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW, || {
                self.render_component(child, batch)
            })?;
        }
        Ok(())
    }

    fn publish(&self, mut batch: RenderBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        batch.sequence = {
            let mut state = lock(&self.inner.state);
            state.swap_in(&batch);
            state.next_batch += 1;
            state.next_batch
        };
        let event = RenderEvent::new(batch);
        self.trace_line(TraceCategory::Render, format!("[render] {event}"));
        self.inner.bus.publish(&event)
    }

    pub(crate) fn trace_line(&self, category: TraceCategory, line: String) {
        lock(&self.inner.trace).line(category, line);
    }

    pub fn enable_trace(&self, enabled: bool) {
        lock(&self.inner.trace).enabled = enabled;
    }

    pub fn set_trace_events(&self, enabled: bool) {
        lock(&self.inner.trace).events = enabled;
    }

    pub fn set_trace_renders(&self, enabled: bool) {
        lock(&self.inner.trace).renders = enabled;
    }

    pub fn set_trace_stderr(&self, enabled: bool) {
        lock(&self.inner.trace).to_stderr = enabled;
    }

    pub fn set_trace_log_limit(&self, max_entries: usize) -> Result<()> {
        lock(&self.inner.trace).set_log_limit(max_entries)
    }

    pub fn take_trace_logs(&self) -> Vec<String> {
        lock(&self.inner.trace).take_logs()
    }
}
