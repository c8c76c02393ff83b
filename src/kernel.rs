use std::path::PathBuf;

use log::debug;

use crate::decoder::ArchWidth;
use crate::error::ResolveMiss;
use crate::image::LoadedImage;

/// Kernel/user address-space split. A containing function whose
/// image-relative low address sits at or above this line belongs to the
/// kernel image, not the user-space library it was found through.
pub const KERNEL_SPLIT_32: u64 = 0xc000_0000;
pub const KERNEL_SPLIT_64: u64 = 0x20_0000_0000;

/// Well-known location of the kernel's symbol-bearing binary.
pub const KERNEL_DEBUG_IMAGE_PATH: &str = "/boot/Kernel.debug";

/// Where and when to reach for the kernel debug image.
///
/// Injected at construction so the split and path are substitutable; the
/// defaults reproduce the shipped behavior exactly.
pub struct KernelMapConfig {
    pub split_address: u64,
    pub debug_image_path: PathBuf,
}

impl KernelMapConfig {
    // FIXME: Ask the running kernel for its image layout instead of a fixed
    // split and path.
    pub fn for_width(width: ArchWidth) -> Self {
        let split_address = match width {
            ArchWidth::Bits32 => KERNEL_SPLIT_32,
            ArchWidth::Bits64 => KERNEL_SPLIT_64,
        };
        Self {
            split_address,
            debug_image_path: PathBuf::from(KERNEL_DEBUG_IMAGE_PATH),
        }
    }

    pub fn is_kernel_address(&self, relative: u64) -> bool {
        relative >= self.split_address
    }

    /// Map and ingest the kernel debug image. Called lazily, only when a
    /// resolution crosses the split; the returned image owns its mapping and
    /// is dropped when that resolution's decode pass finishes.
    pub fn map_kernel_image(&self) -> Result<LoadedImage, ResolveMiss> {
        debug!("mapping kernel debug image {}", self.debug_image_path.display());
        LoadedImage::from_file(&self.debug_image_path, 0).map_err(|err| {
            ResolveMiss::KernelImageUnavailable {
                path: self.debug_image_path.clone(),
                reason: err.to_string(),
            }
        })
    }
}
