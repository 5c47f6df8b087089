//! Typed, append-only output channel between the chain driver and whatever renders it.
//!
//! Every completed step pushes exactly two events: a [`StepEvent::Proposal`] followed by either
//! [`StepEvent::Accept`] or [`StepEvent::Reject`]. Sinks never feed anything back into the chain.

use nalgebra::{DMatrix, DVector};
use std::collections::VecDeque;
use std::sync::mpsc::Sender;

#[derive(Debug, Clone, PartialEq)]
pub enum StepEvent {
    Proposal {
        point: DVector<f64>,
        metric: Option<DMatrix<f64>>,
    },
    /// The candidate that became the new state.
    Accept { point: DVector<f64> },
    /// The candidate that was turned down; the chain repeats its previous state.
    Reject { point: DVector<f64> },
}

impl StepEvent {
    pub fn point(&self) -> &DVector<f64> {
        match self {
            StepEvent::Proposal { point, .. }
            | StepEvent::Accept { point }
            | StepEvent::Reject { point } => point,
        }
    }
}

/// Receives events in emission order. Implementations must not block the sampler.
pub trait EventSink {
    fn push(&mut self, event: StepEvent);
}

impl EventSink for Vec<StepEvent> {
    fn push(&mut self, event: StepEvent) {
        Vec::push(self, event);
    }
}

impl EventSink for VecDeque<StepEvent> {
    fn push(&mut self, event: StepEvent) {
        self.push_back(event);
    }
}

/// Hands events to another thread. A disconnected receiver silently drops them.
impl EventSink for Sender<StepEvent> {
    fn push(&mut self, event: StepEvent) {
        let _ = self.send(event);
    }
}

/// Discards everything.
impl EventSink for () {
    fn push(&mut self, _event: StepEvent) {}
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn push(&mut self, event: StepEvent) {
        (**self).push(event);
    }
}
