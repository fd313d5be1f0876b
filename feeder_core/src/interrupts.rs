//! Process-wide interrupt flags.
//!
//! Edge interrupts on the pellet well and poke lines run argument-less
//! handlers. They only touch the atomics in the [`InterruptFlags`] registered
//! through [`attach`]: no blocking, no I/O, no logging. The controller reads
//! and clears the flags from its own thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::event::Side;

#[derive(Debug, Default)]
pub struct InterruptFlags {
    pellet_available: AtomicBool,
    left: AtomicBool,
    right: AtomicBool,
}

impl InterruptFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pellet_available(&self) -> bool {
        self.pellet_available.load(Ordering::Acquire)
    }

    pub fn set_pellet_available(&self, available: bool) {
        self.pellet_available.store(available, Ordering::Release);
    }

    fn poke_flag(&self, side: Side) -> &AtomicBool {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn poke_pending(&self, side: Side) -> bool {
        self.poke_flag(side).load(Ordering::Acquire)
    }

    /// Consume a pending poke flag.
    pub fn take_poke(&self, side: Side) -> bool {
        self.poke_flag(side).swap(false, Ordering::AcqRel)
    }

    pub fn clear_pokes(&self) {
        self.left.store(false, Ordering::Release);
        self.right.store(false, Ordering::Release);
    }

    fn on_pellet_removed(&self) {
        self.pellet_available.store(false, Ordering::Release);
    }

    fn on_poke(&self, side: Side) {
        // pokes with a pellet in the well are handled by the retrieval wait
        if !self.pellet_available() {
            self.poke_flag(side).store(true, Ordering::Release);
        }
    }
}

static REGISTERED: Mutex<Option<Arc<InterruptFlags>>> = Mutex::new(None);

/// Keeps the flags registered; dropping it detaches them.
#[derive(Debug)]
#[must_use = "dropping the guard detaches the interrupt flags"]
pub struct InterruptGuard {
    flags: Arc<InterruptFlags>,
}

impl InterruptGuard {
    pub fn flags(&self) -> &Arc<InterruptFlags> {
        &self.flags
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        let mut slot = REGISTERED
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.as_ref().is_some_and(|f| Arc::ptr_eq(f, &self.flags)) {
            *slot = None;
            tracing::debug!("interrupt flags detached");
        }
    }
}

/// Register `flags` as the target of the interrupt handlers, replacing any
/// previous registration.
pub fn attach(flags: Arc<InterruptFlags>) -> InterruptGuard {
    let mut slot = REGISTERED
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if slot.is_some() {
        tracing::warn!("replacing previously attached interrupt flags");
    }
    *slot = Some(Arc::clone(&flags));
    tracing::debug!("interrupt flags attached");
    InterruptGuard { flags }
}

pub fn is_attached() -> bool {
    REGISTERED.lock().map(|s| s.is_some()).unwrap_or(false)
}

fn with_registered(f: impl FnOnce(&InterruptFlags)) {
    // never wait inside a handler: a contended slot drops the edge
    if let Ok(slot) = REGISTERED.try_lock()
        && let Some(flags) = slot.as_ref()
    {
        f(flags);
    }
}

/// Pellet-well edge: the pellet left the well.
pub fn pellet_well_isr() {
    with_registered(InterruptFlags::on_pellet_removed);
}

pub fn left_poke_isr() {
    with_registered(|f| f.on_poke(Side::Left));
}

pub fn right_poke_isr() {
    with_registered(|f| f.on_poke(Side::Right));
}

#[cfg(feature = "hardware-errors")]
/// The handlers in the form the hardware backends accept.
pub fn edge_handlers() -> feeder_hardware::EdgeHandlers {
    feeder_hardware::EdgeHandlers {
        pellet_removed: Some(pellet_well_isr),
        left_poke: Some(left_poke_isr),
        right_poke: Some(right_poke_isr),
    }
}
