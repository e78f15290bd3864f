use super::*;
use std::any::{Any, TypeId};

/// Identifier of a component node in a [`Renderer`](crate::Renderer)'s tree.
///
/// Ids are allocated in attach/render order and never reused by the same
/// renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub(crate) usize);

impl ComponentId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Numeric token written into markup that identifies one event callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub(crate) u64);

impl HandlerId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// A unit of UI that renders itself into frames.
///
/// Handlers registered through [`FrameBuilder::on`] receive `&mut Self`, and
/// the component is re-rendered after each handler that returns `Ok`.
pub trait Component: Any + Send {
    fn render(&self, out: &mut FrameBuilder<Self>)
    where
        Self: Sized;

    /// Called when a parent re-render produces this component again at the
    /// same position. The default replaces the whole instance.
    fn set_parameters(&mut self, next: Self)
    where
        Self: Sized,
    {
        *self = next;
    }
}

pub(crate) type EventCallback =
    Arc<dyn Fn(&mut dyn Any, &EventArgs) -> HandlerResult + Send + Sync>;

pub(crate) trait AnyComponent: Send {
    fn render_pending(&self) -> Vec<PendingFrame>;
    fn apply_parameters(&mut self, next: Box<dyn AnyComponent>);
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    fn component_type(&self) -> TypeId;
    fn type_name(&self) -> &'static str;
}

impl<C: Component> AnyComponent for C {
    fn render_pending(&self) -> Vec<PendingFrame> {
        let mut builder = FrameBuilder::<C>::new();
        self.render(&mut builder);
        builder.finish()
    }

    fn apply_parameters(&mut self, next: Box<dyn AnyComponent>) {
        match next.into_any().downcast::<C>() {
            Ok(next) => self.set_parameters(*next),
            Err(_) => tracing::warn!(
                "parameters of a different component type were offered to {}",
                std::any::type_name::<C>()
            ),
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn component_type(&self) -> TypeId {
        TypeId::of::<C>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<C>()
    }
}
