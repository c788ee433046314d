//! Object detector boundary
//!
//! The detection model itself is an external collaborator. This module only
//! defines the data types it returns and the trait the pipeline calls it
//! through.

use crate::frame::PixelFrame;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A bounding box in normalized image coordinates (0.0..=1.0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One recognized object in a frame
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    /// Class label, highest scoring first in the model's label set
    pub label: String,

    /// Model confidence for the label (0.0..=1.0)
    pub confidence: f32,

    /// Normalized bounding box
    pub bounds: BoundingBox,
}

/// All detections for a single frame, in model order
///
/// An empty result is valid and means nothing was recognized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Whether at least one detection carries the given label
    pub fn contains_label(&self, label: &str) -> bool {
        self.detections.iter().any(|d| d.label == label)
    }
}

/// The frame → labeled-boxes function the pipeline feeds every frame into
///
/// Implementations run their inference wherever they like; results come
/// back on the pipeline's control timeline via the returned future.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, frame: Arc<PixelFrame>) -> DetectionResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(label: &str, confidence: f32) -> Detection {
        Detection {
            label: label.to_string(),
            confidence,
            bounds: BoundingBox {
                x: 0.1,
                y: 0.1,
                width: 0.5,
                height: 0.5,
            },
        }
    }

    #[test]
    fn test_contains_label() {
        let result = DetectionResult::new(vec![detection("dog", 0.9), detection("person", 0.7)]);
        assert!(result.contains_label("person"));
        assert!(!result.contains_label("cat"));
    }

    #[test]
    fn test_empty_result_is_valid() {
        let result = DetectionResult::default();
        assert!(result.is_empty());
        assert!(!result.contains_label("person"));
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_string(&detection("person", 0.5)).unwrap();
        assert!(json.contains("\"label\":\"person\""));
        assert!(json.contains("\"bounds\""));
    }
}
