// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Framebuffer objects.  Context-private; cross-thread deletion goes through the
//! owning context's orphan list.

use std::sync::Arc;

use crate::context::{Context, ContextShared};
use crate::driver::{Attachment, Driver, FramebufferId, TextureId};

/// A completeness check that did not come back clean.  The caller decides whether
/// to retry with a different attachment set.
#[derive(Debug, thiserror::Error)]
#[error("Framebuffer incomplete: {status}")]
pub struct IncompleteFramebuffer {
    pub status: &'static str,
}

/// A render-target framebuffer owned by one context.
#[derive(Debug)]
pub struct Framebuffer {
    id: FramebufferId,
    owner: Arc<ContextShared>,
}

impl Framebuffer {
    pub fn new(ctx: &Context) -> Self {
        Framebuffer {
            id: ctx.driver().framebuffer_create(),
            owner: ctx.shared.clone(),
        }
    }

    pub fn attach(&self, attachment: Attachment, texture: TextureId) {
        self.owner.driver().framebuffer_attach(self.id, attachment, texture);
    }

    /// Asks the driver whether the attachment set is renderable.
    pub fn check_complete(&self) -> Result<(), IncompleteFramebuffer> {
        match self.owner.driver().framebuffer_check(self.id).status_text() {
            None => Ok(()),
            Some(status) => Err(IncompleteFramebuffer { status }),
        }
    }

    pub fn bind(&self) {
        self.owner.driver().framebuffer_bind(self.id);
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        self.owner.release_framebuffer(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::trace::TraceDriver;
    use crate::driver::Driver;

    #[test]
    fn completeness_reports_status_text() {
        let driver: Arc<dyn Driver> = TraceDriver::new();
        let ctx = Context::new(driver);
        let framebuffer = Framebuffer::new(&ctx);
        let err = framebuffer.check_complete().expect_err("no attachments");
        assert_eq!(err.status, "no attachments");
        framebuffer.attach(Attachment::Color(0), TextureId(7));
        framebuffer.check_complete().expect("complete");
    }
}
