use crate::image::LoadedImage;

/// The debug session's set of loaded images, queried by runtime address.
///
/// The session owns load addresses; the registry never guesses them. Images
/// are checked in insertion order, which matches how the loader reported
/// them.
#[derive(Default)]
pub struct ImageRegistry {
    images: Vec<LoadedImage>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self { images: Vec::new() }
    }

    pub fn insert(&mut self, image: LoadedImage) {
        self.images.push(image);
    }

    /// The image whose `[base, base + extent)` range contains `address`.
    pub fn library_at(&self, address: u64) -> Option<&LoadedImage> {
        self.images.iter().find(|image| image.contains(address))
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoadedImage> {
        self.images.iter()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
