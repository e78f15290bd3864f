use super::*;
use std::marker::PhantomData;
use std::ops::Deref;

#[derive(Clone)]
struct Snapshot {
    markup: String,
    /// Parse of `markup`, filled on first use.
    nodes: Option<Nodes>,
}

impl Snapshot {
    fn new(markup: String) -> Self {
        Self {
            markup,
            nodes: None,
        }
    }

    fn parsed(&mut self, generation: u64, prefix: &Arc<str>) -> Result<Nodes> {
        if let Some(nodes) = &self.nodes {
            return Ok(nodes.clone());
        }
        let nodes = Nodes::parse(&self.markup, generation, Arc::clone(prefix))?;
        self.nodes = Some(nodes.clone());
        Ok(nodes)
    }
}

struct FragmentCache {
    disposed: bool,
    stale: bool,
    render_count: usize,
    generation: u64,
    current: Snapshot,
    first_render: Snapshot,
    saved: Option<Snapshot>,
}

struct FragmentInner {
    renderer: Renderer,
    root: ComponentId,
    prefix: Arc<str>,
    cache: Mutex<FragmentCache>,
    subscription: Mutex<Option<Subscription>>,
}

impl FragmentInner {
    /// Locks the cache and brings `current` up to date with the renderer.
    fn fresh_cache(&self) -> Result<MutexGuard<'_, FragmentCache>> {
        let mut cache = lock(&self.cache);
        if cache.disposed {
            return Err(Error::Disposed(self.root));
        }
        if cache.stale {
            cache.current = Snapshot::new(self.renderer.markup_of(self.root));
            cache.generation += 1;
            cache.stale = false;
        }
        Ok(cache)
    }
}

struct FragmentObserver {
    fragment: Weak<FragmentInner>,
}

impl RenderEventObserver for FragmentObserver {
    fn on_next(&self, event: &RenderEvent) {
        let Some(fragment) = self.fragment.upgrade() else {
            return;
        };
        let mut cache = lock(&fragment.cache);
        if event.is_disposed(fragment.root) {
            cache.disposed = true;
        } else if event.has_changes_to(fragment.root) {
            cache.stale = true;
            cache.render_count += 1;
        }
    }

    fn on_completed(&self) {
        if let Some(fragment) = self.fragment.upgrade() {
            lock(&fragment.cache).disposed = true;
        }
    }
}

/// Cached rendering of one component subtree.
///
/// The markup is recomputed lazily, only after a render batch touched the
/// subtree; the parsed [`Nodes`] are derived from that markup under the same
/// lock, so the two never disagree. Once the root leaves the tree every
/// accessor fails with [`Error::Disposed`].
#[derive(Clone)]
pub struct RenderedFragment {
    inner: Arc<FragmentInner>,
}

impl RenderedFragment {
    pub(crate) fn attach(renderer: Renderer, root: ComponentId) -> Result<Self> {
        let prefix: Arc<str> = Arc::from(renderer.options().attribute_prefix());
        let inner = Arc::new(FragmentInner {
            renderer,
            root,
            prefix,
            cache: Mutex::new(FragmentCache {
                disposed: false,
                stale: false,
                render_count: 0,
                generation: 0,
                current: Snapshot::new(String::new()),
                first_render: Snapshot::new(String::new()),
                saved: None,
            }),
            subscription: Mutex::new(None),
        });

        // Subscribe before reading the first markup so no batch is missed.
        let observer: Arc<dyn RenderEventObserver> = Arc::new(FragmentObserver {
            fragment: Arc::downgrade(&inner),
        });
        let subscription = inner.renderer.event_bus().subscribe(observer);
        *lock(&inner.subscription) = Some(subscription);

        if inner.renderer.is_disposed() {
            return Err(Error::PostCompletionUsage);
        }
        if !inner.renderer.contains(root) {
            return Err(Error::UnknownComponentId(root));
        }

        {
            let mut cache = lock(&inner.cache);
            let first = Snapshot::new(inner.renderer.markup_of(root));
            cache.current = first.clone();
            cache.first_render = first;
            cache.stale = false;
            cache.render_count = 0;
        }
        Ok(Self { inner })
    }

    pub fn root_id(&self) -> ComponentId {
        self.inner.root
    }

    pub fn renderer(&self) -> &Renderer {
        &self.inner.renderer
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.inner.cache).disposed
    }

    pub fn markup(&self) -> Result<String> {
        Ok(self.inner.fresh_cache()?.current.markup.clone())
    }

    pub fn nodes(&self) -> Result<Nodes> {
        let mut cache = self.inner.fresh_cache()?;
        let generation = cache.generation;
        cache.current.parsed(generation, &self.inner.prefix)
    }

    /// Batches that changed this subtree since the first render.
    pub fn render_count(&self) -> Result<usize> {
        Ok(self.inner.fresh_cache()?.render_count)
    }

    pub fn save_snapshot(&self) -> Result<()> {
        let mut cache = self.inner.fresh_cache()?;
        cache.saved = Some(cache.current.clone());
        Ok(())
    }

    pub fn changes_since_snapshot(&self) -> Result<Vec<MarkupChange>> {
        let mut cache = self.inner.fresh_cache()?;
        let generation = cache.generation;
        let current = cache.current.parsed(generation, &self.inner.prefix)?;
        let saved = cache
            .saved
            .as_mut()
            .ok_or(Error::NoSnapshot)?
            .parsed(generation, &self.inner.prefix)?;
        markup_diff::MarkupDiffer::new(&self.inner.prefix).diff(saved.dom(), current.dom())
    }

    pub fn changes_since_first_render(&self) -> Result<Vec<MarkupChange>> {
        let mut cache = self.inner.fresh_cache()?;
        let generation = cache.generation;
        let current = cache.current.parsed(generation, &self.inner.prefix)?;
        let first = cache.first_render.parsed(0, &self.inner.prefix)?;
        markup_diff::MarkupDiffer::new(&self.inner.prefix).diff(first.dom(), current.dom())
    }

    /// Compares the current markup with `expected`, ignoring whitespace-only
    /// text and handler attributes. An expected attribute `name:regex="re"`
    /// matches when the whole actual `name` value matches `re`.
    pub fn markup_matches(&self, expected: &str) -> Result<()> {
        let actual = self.nodes()?;
        let expected_dom = parse_html(expected)?;
        let changes = markup_diff::MarkupDiffer::new(&self.inner.prefix)
            .with_regex_attributes()
            .diff(&expected_dom, actual.dom())?;
        if changes.is_empty() {
            return Ok(());
        }
        Err(Error::AssertionFailed {
            expected: expected.to_string(),
            actual: actual.to_html(),
            changes,
        })
    }

    pub fn find(&self, selector: &str) -> Result<ElementRef> {
        self.nodes()?
            .query(selector)?
            .ok_or_else(|| Error::SelectorNotFound(selector.to_string()))
    }

    pub fn find_all(&self, selector: &str) -> Result<Vec<ElementRef>> {
        self.nodes()?.query_all(selector)
    }

    /// Dispatches `event` on `element` the way a browser would, then returns
    /// once every resulting render batch was delivered.
    ///
    /// An `element` taken from an older rendering is looked up again by its
    /// structural path in the current one.
    pub fn trigger_event(&self, element: &ElementRef, event: &str, args: EventArgs) -> Result<()> {
        let nodes = self.nodes()?;
        let target = if element.nodes().same_snapshot(&nodes) {
            element.node()
        } else {
            nodes
                .dom()
                .resolve_path(element.path())
                .filter(|node| nodes.dom().tag_name(*node) == Some(element.tag_name()))
                .ok_or_else(|| Error::StaleElement(element.path_string()))?
        };
        event_dispatch::trigger(&self.inner.renderer, &nodes, target, event, &args)
    }

    fn trigger_on(&self, selector: &str, event: &str, args: EventArgs) -> Result<()> {
        let element = self.find(selector)?;
        self.trigger_event(&element, event, args)
    }

    pub fn click(&self, selector: &str) -> Result<()> {
        self.trigger_on(selector, "onclick", EventArgs::click())
    }

    pub fn double_click(&self, selector: &str) -> Result<()> {
        self.trigger_on(
            selector,
            "ondblclick",
            EventArgs::Mouse(MouseEventArgs {
                detail: 2,
                ..MouseEventArgs::default()
            }),
        )
    }

    pub fn change(&self, selector: &str, value: impl Into<String>) -> Result<()> {
        self.trigger_on(selector, "onchange", EventArgs::change(value))
    }

    pub fn input(&self, selector: &str, value: impl Into<String>) -> Result<()> {
        self.trigger_on(selector, "oninput", EventArgs::change(value))
    }

    pub fn key_down(&self, selector: &str, key: &str) -> Result<()> {
        self.trigger_on(
            selector,
            "onkeydown",
            EventArgs::Keyboard(KeyboardEventArgs::key(key)),
        )
    }

    pub fn focus(&self, selector: &str) -> Result<()> {
        self.trigger_on(selector, "onfocus", EventArgs::Focus)
    }

    pub fn blur(&self, selector: &str) -> Result<()> {
        self.trigger_on(selector, "onblur", EventArgs::Focus)
    }

    pub fn submit(&self, selector: &str) -> Result<()> {
        self.trigger_on(selector, "onsubmit", EventArgs::Empty)
    }

    pub fn find_component<C: Component>(&self) -> Result<RenderedComponent<C>> {
        self.find_components::<C>()?
            .into_iter()
            .next()
            .ok_or(Error::ComponentNotFound(std::any::type_name::<C>()))
    }

    /// Components of type `C` below the root, depth first.
    pub fn find_components<C: Component>(&self) -> Result<Vec<RenderedComponent<C>>> {
        if self.is_disposed() {
            return Err(Error::Disposed(self.inner.root));
        }
        self.inner
            .renderer
            .find_components::<C>(self.inner.root)
            .into_iter()
            .map(|id| RenderedComponent::attach(self.inner.renderer.clone(), id))
            .collect()
    }
}

impl fmt::Debug for RenderedFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cache = lock(&self.inner.cache);
        f.debug_struct("RenderedFragment")
            .field("root", &self.inner.root)
            .field("disposed", &cache.disposed)
            .field("stale", &cache.stale)
            .field("render_count", &cache.render_count)
            .finish()
    }
}

/// A [`RenderedFragment`] whose root is known to be a `C`.
pub struct RenderedComponent<C> {
    fragment: RenderedFragment,
    _component: PhantomData<fn() -> C>,
}

impl<C: Component> RenderedComponent<C> {
    pub(crate) fn attach(renderer: Renderer, root: ComponentId) -> Result<Self> {
        renderer.with_component::<C, ()>(root, |_| ())?;
        Ok(Self {
            fragment: RenderedFragment::attach(renderer, root)?,
            _component: PhantomData,
        })
    }

    /// Reads the live component instance.
    pub fn instance<R>(&self, read: impl FnOnce(&C) -> R) -> Result<R> {
        if self.fragment.is_disposed() {
            return Err(Error::Disposed(self.fragment.root_id()));
        }
        self.fragment
            .renderer()
            .with_component(self.fragment.root_id(), read)
    }

    /// Mutates the live instance on the renderer and re-renders it.
    pub fn invoke<R>(&self, action: impl FnOnce(&mut C) -> R) -> Result<R> {
        if self.fragment.is_disposed() {
            return Err(Error::Disposed(self.fragment.root_id()));
        }
        self.fragment
            .renderer()
            .invoke(self.fragment.root_id(), action)
    }

    pub fn into_fragment(self) -> RenderedFragment {
        self.fragment
    }
}

impl<C> Clone for RenderedComponent<C> {
    fn clone(&self) -> Self {
        Self {
            fragment: self.fragment.clone(),
            _component: PhantomData,
        }
    }
}

impl<C> Deref for RenderedComponent<C> {
    type Target = RenderedFragment;

    fn deref(&self) -> &RenderedFragment {
        &self.fragment
    }
}

impl<C> fmt::Debug for RenderedComponent<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderedComponent")
            .field("type", &std::any::type_name::<C>())
            .field("fragment", &self.fragment)
            .finish()
    }
}
