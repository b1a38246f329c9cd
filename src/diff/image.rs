// Image inventory comparison between two captures.
use crate::normalizer::ImageRef;
use scraper::Html;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageChange {
    pub old: ImageRef,
    pub new: ImageRef,
}

/// Set comparison keyed on absolute URL. `changed` holds images present
/// on both sides whose alt text differs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageDiff {
    pub added: Vec<ImageRef>,
    pub removed: Vec<ImageRef>,
    pub changed: Vec<ImageChange>,
}

impl ImageDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Compares the image inventories of two raw captures. Without a source
/// URL there is nothing to resolve against and the result is empty sets,
/// not None.
pub fn compute_image_diff(old_content: &str, new_content: &str, url: Option<&str>) -> ImageDiff {
    if url.is_none() {
        return ImageDiff::default();
    }

    let old_doc = Html::parse_document(old_content);
    let new_doc = Html::parse_document(new_content);
    let old_images = crate::normalizer::extract_images(&old_doc, url);
    let new_images = crate::normalizer::extract_images(&new_doc, url);

    diff_inventories(&old_images, &new_images)
}

pub fn diff_inventories(old_images: &[ImageRef], new_images: &[ImageRef]) -> ImageDiff {
    let old_srcs: HashSet<&str> = old_images.iter().map(|i| i.src.as_str()).collect();
    let new_srcs: HashSet<&str> = new_images.iter().map(|i| i.src.as_str()).collect();

    let mut diff = ImageDiff::default();

    for img in new_images {
        if !old_srcs.contains(img.src.as_str()) {
            diff.added.push(img.clone());
        } else if let Some(old_img) = old_images.iter().find(|i| i.src == img.src) {
            if old_img.alt != img.alt {
                diff.changed.push(ImageChange {
                    old: old_img.clone(),
                    new: img.clone(),
                });
            }
        }
    }

    for img in old_images {
        if !new_srcs.contains(img.src.as_str()) {
            diff.removed.push(img.clone());
        }
    }

    diff
}
