use alloc::vec::Vec;

use crate::result::KernelError;

/// Allocate a zero-length vector with room for `cap` elements, reporting
/// allocation failure instead of aborting.
pub(crate) fn vec_with_capacity<T>(cap: usize) -> Result<Vec<T>, KernelError> {
    let mut ret = Vec::<T>::new();
    ret.try_reserve_exact(cap)?;
    Ok(ret)
}

/// Allocate a vector of `len` default values for the kernel to fill in.
pub(crate) fn vec_zeroed<T: Default + Clone>(len: usize) -> Result<Vec<T>, KernelError> {
    let mut ret = vec_with_capacity::<T>(len)?;
    ret.resize(len, T::default());
    Ok(ret)
}

/// Retry an ioctl for as long as it fails with EINTR or EAGAIN, as libdrm's
/// `drmIoctl` does. Not for reads, where EAGAIN means no data.
macro_rules! retry_eintr {
    ($e:expr) => {
        loop {
            match $e {
                Err(linux_io::result::EINTR) | Err(linux_io::result::EAGAIN) => continue,
                other => break other,
            }
        }
    };
}

pub(crate) use retry_eintr;
