use log::{trace, warn};

use super::BlobId;
use crate::device::KmsDevice;
use crate::result::KernelError;

/// A handle for a live property blob.
///
/// The blob borrows the device it was created on, so it can't outlive the
/// file descriptor. The [`Drop`] implementation destroys the blob in the
/// kernel; use [`BlobHandle::destroy`] to observe a failure to do so.
pub struct BlobHandle<'d, D: KmsDevice + ?Sized> {
    id: Option<BlobId>,
    dev: &'d D,
}

impl<'d, D: KmsDevice + ?Sized> BlobHandle<'d, D> {
    /// Copy `data` into a new kernel-side blob.
    pub fn create(dev: &'d D, data: &[u8]) -> Result<Self, KernelError> {
        let id = dev.create_property_blob(data)?;
        trace!("created property blob {id} ({} bytes)", data.len());
        Ok(Self { id: Some(id), dev })
    }

    #[inline]
    pub fn id(&self) -> BlobId {
        // Only destroy_internal clears the id, and it's never observable
        // afterwards.
        self.id.unwrap_or_default()
    }

    /// Consume the handle and destroy the underlying blob in the kernel.
    #[inline]
    pub fn destroy(mut self) -> Result<(), KernelError> {
        self.destroy_internal()
    }

    fn destroy_internal(&mut self) -> Result<(), KernelError> {
        if let Some(id) = self.id.take() {
            self.dev.destroy_property_blob(id)?;
            trace!("destroyed property blob {id}");
        }
        Ok(())
    }
}

impl<D: KmsDevice + ?Sized> Drop for BlobHandle<'_, D> {
    fn drop(&mut self) {
        if let Err(e) = self.destroy_internal() {
            warn!("failed to destroy property blob: {e}");
        }
    }
}

impl<D: KmsDevice + ?Sized> core::fmt::Debug for BlobHandle<'_, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BlobHandle").field("id", &self.id).finish()
    }
}
