use super::*;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub(crate) struct UpdatedComponent {
    pub(crate) frames: Arc<Vec<Frame>>,
    /// Ancestors at the time of the update, nearest first.
    pub(crate) ancestors: Vec<ComponentId>,
}

/// Immutable description of one tree update.
#[derive(Debug, Clone, Default)]
pub(crate) struct RenderBatch {
    pub(crate) sequence: u64,
    pub(crate) updated: BTreeMap<ComponentId, UpdatedComponent>,
    pub(crate) disposed: BTreeMap<ComponentId, Vec<ComponentId>>,
}

impl RenderBatch {
    pub(crate) fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.disposed.is_empty()
    }
}

/// A completed render batch as seen by bus subscribers.
#[derive(Debug, Clone)]
pub struct RenderEvent {
    batch: Arc<RenderBatch>,
}

impl RenderEvent {
    pub(crate) fn new(batch: RenderBatch) -> Self {
        Self {
            batch: Arc::new(batch),
        }
    }

    /// Position of this batch in the renderer's output, starting at 1.
    pub fn sequence(&self) -> u64 {
        self.batch.sequence
    }

    pub fn did_component_render(&self, component: ComponentId) -> bool {
        self.batch.updated.contains_key(&component)
    }

    pub fn is_disposed(&self, component: ComponentId) -> bool {
        self.batch.disposed.contains_key(&component)
    }

    /// True when `component` or any of its descendants rendered or was
    /// disposed in this batch, i.e. its markup may differ afterwards.
    pub fn has_changes_to(&self, component: ComponentId) -> bool {
        if self.did_component_render(component) || self.is_disposed(component) {
            return true;
        }
        self.batch
            .updated
            .values()
            .any(|update| update.ancestors.contains(&component))
            || self
                .batch
                .disposed
                .values()
                .any(|ancestors| ancestors.contains(&component))
    }

    pub fn frames_of(&self, component: ComponentId) -> Option<&[Frame]> {
        self.batch
            .updated
            .get(&component)
            .map(|update| update.frames.as_slice())
    }

    pub fn updated_components(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.batch.updated.keys().copied()
    }

    pub fn disposed_components(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.batch.disposed.keys().copied()
    }
}

fn join_ids<'a>(ids: impl Iterator<Item = &'a ComponentId>) -> String {
    ids.map(ToString::to_string).collect::<Vec<_>>().join(",")
}

impl fmt::Display for RenderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch={} updated=[{}] disposed=[{}]",
            self.batch.sequence,
            join_ids(self.batch.updated.keys()),
            join_ids(self.batch.disposed.keys())
        )
    }
}
