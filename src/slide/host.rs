//! Holder for the slide currently shown by the viewer.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::session::{Slide, SlideOpenConfig};
use crate::error::SlideError;
use crate::pyramid::Extent;
use crate::tile::TileLoader;

/// Keeps at most one slide open.
///
/// Opening a new slide closes the previous one, so tiles decoded for the old
/// slide are never served for the new one.
pub struct SlideHost<L: TileLoader> {
    active: RwLock<Option<Arc<Slide<L>>>>,
}

impl<L: TileLoader> SlideHost<L> {
    pub fn new() -> Self {
        Self {
            active: RwLock::new(None),
        }
    }

    /// Open a slide and make it the active one.
    ///
    /// The previous slide is closed only once the new one opened
    /// successfully; on error the active slide is left untouched.
    pub fn open(
        &self,
        extent: Extent,
        loader: Arc<L>,
        config: SlideOpenConfig,
    ) -> Result<Arc<Slide<L>>, SlideError> {
        let slide = Arc::new(Slide::open(extent, loader, config)?);

        let previous = self.active.write().replace(slide.clone());
        if let Some(previous) = previous {
            debug!("Replacing active slide");
            previous.close();
        }
        Ok(slide)
    }

    /// Close the active slide. Returns `false` if none was open.
    pub fn close(&self) -> bool {
        match self.active.write().take() {
            Some(slide) => {
                slide.close();
                true
            }
            None => false,
        }
    }

    /// The active slide, if any.
    pub fn active(&self) -> Option<Arc<Slide<L>>> {
        self.active.read().clone()
    }
}

impl<L: TileLoader> Default for SlideHost<L> {
    fn default() -> Self {
        Self::new()
    }
}
