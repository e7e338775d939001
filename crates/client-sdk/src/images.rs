use dugong_protocol::SessionFile;
use serde::{Deserialize, Serialize};

use crate::dates::extract_formatted_date;

/// Classification reported when the detector has not labelled an image yet.
pub const UNKNOWN_CLASS: &str = "unknown";

const FALLBACK_IMAGE_NAME: &str = "image.jpg";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub image_id: usize,
    pub image_url: String,
    #[serde(default)]
    pub filename: String,
    pub dugong_count: u32,
    pub calf_count: u32,
    pub image_class: String,
    pub created_at: String,
}

impl DetectionResult {
    pub fn from_session_file(index: usize, file: &SessionFile, last_activity: Option<&str>) -> Self {
        Self {
            image_id: index,
            image_url: file.image_url.clone().unwrap_or_default(),
            filename: file.filename.clone(),
            dugong_count: file.dugong_count.unwrap_or(0),
            calf_count: file.calf_count.unwrap_or(0),
            image_class: file
                .image_class
                .clone()
                .unwrap_or_else(|| UNKNOWN_CLASS.to_string()),
            created_at: file
                .created_at
                .as_deref()
                .or(last_activity)
                .unwrap_or_default()
                .to_string(),
        }
    }

    /// Object name used by the storage bucket: last path segment of the URL.
    pub fn image_name(&self) -> &str {
        let from_url = self.image_url.rsplit('/').next().unwrap_or_default();
        [from_url, self.filename.as_str()]
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or(FALLBACK_IMAGE_NAME)
    }

    /// Animals in frame; every mother-calf detection is a pair.
    pub fn total_count(&self) -> u32 {
        self.dugong_count.saturating_add(self.calf_count.saturating_mul(2))
    }

    pub fn captured_date(&self) -> String {
        extract_formatted_date(self.image_name())
    }
}

/// Latest detection snapshot plus a 1-based cursor into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResultSet {
    results: Vec<DetectionResult>,
    cursor: usize,
    marked_poor: Vec<String>,
}

impl Default for ImageResultSet {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            cursor: 1,
            marked_poor: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultsEnvelope {
    pub results: Vec<DetectionResult>,
}

/// On-disk shape of the `image-storage` record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageSnapshot {
    pub current_image: usize,
    pub api_response: Option<ResultsEnvelope>,
    pub total_images: usize,
    pub marked_poor: Vec<String>,
}

impl ImageResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole result list with a fresh server snapshot and rewinds the cursor.
    pub fn replace_results(&mut self, files: &[SessionFile], last_activity: Option<&str>) {
        self.results = files
            .iter()
            .enumerate()
            .map(|(idx, file)| DetectionResult::from_session_file(idx, file, last_activity))
            .collect();
        self.cursor = 1;
    }

    pub fn go_previous(&mut self) {
        if self.cursor > 1 {
            self.cursor -= 1;
        }
    }

    pub fn go_next(&mut self) {
        if self.cursor < self.total_images() {
            self.cursor += 1;
        }
    }

    pub fn select(&mut self, position: usize) {
        self.cursor = clamp_cursor(position, self.total_images());
    }

    pub fn current_item(&self) -> Option<&DetectionResult> {
        self.results.get(self.cursor.checked_sub(1)?)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn total_images(&self) -> usize {
        self.results.len()
    }

    pub fn results(&self) -> &[DetectionResult] {
        &self.results
    }

    pub fn is_marked_poor(&self, image_name: &str) -> bool {
        self.marked_poor.iter().any(|m| m == image_name)
    }

    /// Records a poor-quality flag; returns `false` if the image was already flagged.
    pub fn mark_poor(&mut self, image_name: &str) -> bool {
        if self.is_marked_poor(image_name) {
            return false;
        }
        self.marked_poor.push(image_name.to_string());
        true
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn to_snapshot(&self) -> ImageSnapshot {
        ImageSnapshot {
            current_image: self.cursor,
            api_response: (!self.results.is_empty()).then(|| ResultsEnvelope {
                results: self.results.clone(),
            }),
            total_images: self.results.len(),
            marked_poor: self.marked_poor.clone(),
        }
    }

    /// Restores a persisted snapshot, re-clamping the cursor to the restored list.
    pub fn from_snapshot(snapshot: ImageSnapshot) -> Self {
        let results = snapshot.api_response.map(|r| r.results).unwrap_or_default();
        let cursor = clamp_cursor(snapshot.current_image, results.len());
        Self {
            results,
            cursor,
            marked_poor: snapshot.marked_poor,
        }
    }
}

fn clamp_cursor(position: usize, total: usize) -> usize {
    position.clamp(1, total.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> SessionFile {
        SessionFile {
            filename: name.to_string(),
            ..SessionFile::default()
        }
    }

    fn set_of(n: usize) -> ImageResultSet {
        let files: Vec<SessionFile> = (0..n).map(|i| file(&format!("img_{i}.jpg"))).collect();
        let mut set = ImageResultSet::new();
        set.replace_results(&files, None);
        set
    }

    #[test]
    fn replace_maps_defaults() {
        let mut set = ImageResultSet::new();
        let files = vec![SessionFile {
            filename: "a_20230601.jpg".into(),
            dugong_count: Some(2),
            calf_count: Some(1),
            ..SessionFile::default()
        }];
        set.replace_results(&files, Some("2024-01-01T00:00:00"));
        assert_eq!(set.total_images(), 1);
        assert_eq!(set.cursor(), 1);
        let first = &set.results()[0];
        assert_eq!(first.dugong_count, 2);
        assert_eq!(first.calf_count, 1);
        assert_eq!(first.image_class, UNKNOWN_CLASS);
        assert_eq!(first.image_url, "");
        assert_eq!(first.created_at, "2024-01-01T00:00:00");
        assert_eq!(first.image_name(), "a_20230601.jpg");
        assert_eq!(first.captured_date(), "01/06/2023");
        assert_eq!(first.total_count(), 4);
    }

    #[test]
    fn replace_always_rewinds_cursor() {
        let mut set = set_of(5);
        set.select(4);
        assert_eq!(set.cursor(), 4);
        set.replace_results(&[file("x.jpg"), file("y.jpg")], None);
        assert_eq!(set.cursor(), 1);
        set.replace_results(&[], None);
        assert_eq!(set.cursor(), 1);
        assert!(set.current_item().is_none());
    }

    #[test]
    fn navigation_clamps_at_both_ends() {
        let mut set = set_of(3);
        set.go_previous();
        assert_eq!(set.cursor(), 1);
        set.go_next();
        set.go_next();
        set.go_next();
        assert_eq!(set.cursor(), 3);
        assert_eq!(set.current_item().map(|r| r.image_id), Some(2));
        set.go_previous();
        assert_eq!(set.cursor(), 2);
    }

    #[test]
    fn navigation_is_noop_on_single_and_empty() {
        for n in [0, 1] {
            let mut set = set_of(n);
            set.go_next();
            assert_eq!(set.cursor(), 1);
            set.go_previous();
            assert_eq!(set.cursor(), 1);
        }
    }

    #[test]
    fn select_clamps() {
        let mut set = set_of(3);
        set.select(0);
        assert_eq!(set.cursor(), 1);
        set.select(99);
        assert_eq!(set.cursor(), 3);
    }

    #[test]
    fn image_name_prefers_url_segment() {
        let result = DetectionResult::from_session_file(
            0,
            &SessionFile {
                filename: "local.jpg".into(),
                image_url: Some("https://bucket/S1/images/dugong_20240105.jpg".into()),
                ..SessionFile::default()
            },
            None,
        );
        assert_eq!(result.image_name(), "dugong_20240105.jpg");

        let bare = DetectionResult::from_session_file(0, &SessionFile::default(), None);
        assert_eq!(bare.image_name(), "image.jpg");
    }

    #[test]
    fn mark_poor_is_idempotent_and_cleared() {
        let mut set = set_of(2);
        assert!(set.mark_poor("img_0.jpg"));
        assert!(!set.mark_poor("img_0.jpg"));
        set.replace_results(&[file("img_0.jpg")], None);
        assert!(set.is_marked_poor("img_0.jpg"));
        set.clear();
        assert!(!set.is_marked_poor("img_0.jpg"));
        assert_eq!(set.total_images(), 0);
        assert_eq!(set.cursor(), 1);
    }

    #[test]
    fn snapshot_restore_reclamps_cursor() {
        let mut set = set_of(3);
        set.select(3);
        let mut snapshot = set.to_snapshot();
        assert_eq!(snapshot.total_images, 3);
        assert_eq!(snapshot.current_image, 3);

        let restored = ImageResultSet::from_snapshot(snapshot.clone());
        assert_eq!(restored, set);

        snapshot.current_image = 42;
        assert_eq!(ImageResultSet::from_snapshot(snapshot).cursor(), 3);

        let empty = ImageResultSet::from_snapshot(ImageSnapshot::default());
        assert_eq!(empty.cursor(), 1);
        assert!(empty.to_snapshot().api_response.is_none());
    }
}
