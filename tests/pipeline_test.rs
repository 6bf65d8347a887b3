use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{Array3, Axis, IxDyn};
use petlens::{
  ClassificationResult, PetPipeline, PipelineConfig, PipelineError, PixelBuffer,
  model::{InferenceSession, LabelTable, Model, Tensor},
  pipeline::Stage,
  postprocess::{BoundingBox, BoxEncoding},
};

const HIGH: f32 = 10.0;
const LOW: f32 = -10.0;

#[derive(Debug, thiserror::Error)]
#[error("mock failure: {0}")]
struct MockError(String);

/// 检测模型替身：返回固定的 `[1, N, 7]` 输出（x1, y1, x2, y2, obj, cat, dog）
struct FixedDetector {
  rows: Vec<[f32; 7]>,
  input_shape: Option<Vec<i64>>,
  fail: bool,
}

impl FixedDetector {
  fn new(rows: Vec<[f32; 7]>) -> Self {
    Self {
      rows,
      input_shape: None,
      fail: false,
    }
  }

  fn failing() -> Self {
    Self {
      rows: Vec::new(),
      input_shape: None,
      fail: true,
    }
  }
}

impl InferenceSession for FixedDetector {
  type Error = MockError;

  fn run(&self, _input: &Tensor) -> Result<Tensor, Self::Error> {
    if self.fail {
      return Err(MockError("detector offline".to_string()));
    }
    let data = self.rows.iter().flatten().copied().collect::<Vec<_>>();
    let output = Array3::from_shape_vec((1, self.rows.len(), 7), data)
      .map_err(|e| MockError(e.to_string()))?;
    Ok(output.into_dyn())
  }

  fn input_shape(&self) -> Option<&[i64]> {
    self.input_shape.as_deref()
  }
}

/// 分类模型替身：红色为主的裁剪（R 通道均值 > 0.5）报错，否则 logits 为 [0, 5, 0]
#[derive(Default)]
struct ColorClassifier {
  calls: AtomicUsize,
}

impl InferenceSession for ColorClassifier {
  type Error = MockError;

  fn run(&self, input: &Tensor) -> Result<Tensor, Self::Error> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let red = input.index_axis(Axis(1), 0).mean().unwrap_or(0.0);
    if red > 0.5 {
      return Err(MockError("cannot classify red crops".to_string()));
    }
    Tensor::from_shape_vec(IxDyn(&[1, 3]), vec![0.0, 5.0, 0.0]).map_err(|e| MockError(e.to_string()))
  }
}

/// 200×100：左半红、右半蓝
fn half_red_half_blue() -> PixelBuffer {
  let data = (0..200u32 * 100)
    .flat_map(|i| if i % 200 < 100 { [255, 0, 0] } else { [0, 0, 255] })
    .collect::<Vec<u8>>();
  PixelBuffer::rgb(200, 100, data).unwrap()
}

/// 检测输入 200：scale = 1，pad_y = 50
fn config() -> PipelineConfig {
  PipelineConfig::default()
    .with_detection_input_size(200)
    .with_box_encoding(BoxEncoding::Xyxy)
}

fn breed_labels() -> LabelTable {
  LabelTable::from_slice(&["poodle", "shiba", "beagle"])
}

fn cat_and_dog_rows() -> Vec<[f32; 7]> {
  vec![
    [10.0, 60.0, 90.0, 140.0, HIGH, HIGH, LOW],
    [110.0, 60.0, 190.0, 140.0, HIGH, LOW, HIGH],
  ]
}

fn assert_box_near(actual: &BoundingBox, expected: &BoundingBox) {
  let pairs = [
    (actual.left, expected.left),
    (actual.top, expected.top),
    (actual.right, expected.right),
    (actual.bottom, expected.bottom),
  ];
  for (a, e) in pairs {
    assert!((a - e).abs() < 1e-3, "{:?} != {:?}", actual, expected);
  }
}

#[test]
fn test_dog_is_detected_and_classified() {
  let classifier = ColorClassifier::default();
  let pipeline = PetPipeline::new(
    FixedDetector::new(cat_and_dog_rows()),
    &classifier,
    breed_labels(),
    config(),
  );

  let results = pipeline
    .detect_and_classify(&half_red_half_blue(), &config())
    .unwrap();

  assert_eq!(results.len(), 1);
  let result = &results[0];
  assert_eq!(result.detection.label, "dog");
  assert_eq!(result.breed_index, 1);
  assert_eq!(result.breed_label, "shiba");
  assert!((result.breed_probability - 0.9867).abs() < 1e-3);
  assert_box_near(&result.detection.bbox, &BoundingBox::new(110.0, 10.0, 190.0, 90.0));
  // 默认只对狗做品种分类
  assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_detect_returns_both_pets() {
  let pipeline = PetPipeline::new(
    FixedDetector::new(cat_and_dog_rows()),
    ColorClassifier::default(),
    breed_labels(),
    config(),
  );

  let detections = pipeline.detect(&half_red_half_blue(), &config()).unwrap();
  let labels = detections.iter().map(|d| d.label.as_str()).collect::<Vec<_>>();
  assert_eq!(labels.len(), 2);
  assert!(labels.contains(&"cat") && labels.contains(&"dog"));
  for det in &detections {
    assert!(det.bbox.is_valid());
    assert!(det.bbox.right <= 199.0 && det.bbox.bottom <= 99.0);
    assert!((0.0..=1.0).contains(&det.confidence));
  }
}

#[test]
fn test_classification_failure_skips_only_that_detection() {
  let classifier = ColorClassifier::default();
  let config = config().with_classify_labels(["cat", "dog"]);
  let pipeline = PetPipeline::new(
    FixedDetector::new(cat_and_dog_rows()),
    &classifier,
    breed_labels(),
    config.clone(),
  );

  let results = pipeline
    .detect_and_classify(&half_red_half_blue(), &config)
    .unwrap();

  assert_eq!(results.len(), 1);
  assert_eq!(results[0].detection.label, "dog");
  assert_eq!(classifier.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_detection_failure_fails_the_call() {
  let classifier = ColorClassifier::default();
  let pipeline = PetPipeline::new(FixedDetector::failing(), &classifier, breed_labels(), config());

  let error = pipeline
    .detect_and_classify(&half_red_half_blue(), &config())
    .unwrap_err();

  assert!(matches!(
    error,
    PipelineError::ModelInference {
      stage: Stage::Detect,
      ..
    }
  ));
  assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_low_scores_yield_empty_results() {
  let rows = vec![[110.0, 60.0, 190.0, 140.0, LOW, LOW, HIGH]];
  let pipeline = PetPipeline::new(
    FixedDetector::new(rows),
    ColorClassifier::default(),
    breed_labels(),
    config(),
  );

  let results = pipeline
    .detect_and_classify(&half_red_half_blue(), &config())
    .unwrap();
  assert!(results.is_empty());

  let pipeline = PetPipeline::new(
    FixedDetector::new(Vec::new()),
    ColorClassifier::default(),
    breed_labels(),
    config(),
  );
  assert!(pipeline.detect_and_classify(&half_red_half_blue(), &config()).unwrap().is_empty());
}

struct RankFourDetector;

impl InferenceSession for RankFourDetector {
  type Error = MockError;

  fn run(&self, _input: &Tensor) -> Result<Tensor, Self::Error> {
    Ok(Tensor::zeros(IxDyn(&[1, 1, 2, 7])))
  }
}

#[test]
fn test_malformed_detector_output_is_invalid_input() {
  let pipeline = PetPipeline::new(RankFourDetector, ColorClassifier::default(), breed_labels(), config());
  let error = pipeline.detect(&half_red_half_blue(), &config()).unwrap_err();
  assert!(matches!(error, PipelineError::InvalidInput(_)));
}

#[test]
fn test_zero_area_image_is_invalid_input() {
  let pipeline = PetPipeline::new(
    FixedDetector::new(cat_and_dog_rows()),
    ColorClassifier::default(),
    breed_labels(),
    config(),
  );
  let empty = PixelBuffer::rgb(0, 10, Vec::new()).unwrap();
  assert!(matches!(
    pipeline.detect_and_classify(&empty, &config()),
    Err(PipelineError::InvalidInput(_))
  ));
}

fn four_dogs() -> Vec<[f32; 7]> {
  vec![
    [105.0, 55.0, 145.0, 95.0, HIGH, LOW, HIGH],
    [155.0, 55.0, 195.0, 95.0, HIGH, LOW, HIGH],
    [105.0, 105.0, 145.0, 145.0, HIGH, LOW, HIGH],
    [155.0, 105.0, 195.0, 145.0, HIGH, LOW, HIGH],
  ]
}

fn sorted_boxes(results: &[ClassificationResult]) -> Vec<(i32, i32)> {
  let mut boxes = results
    .iter()
    .map(|r| (r.detection.bbox.left as i32, r.detection.bbox.top as i32))
    .collect::<Vec<_>>();
  boxes.sort();
  boxes
}

#[test]
fn test_parallel_classification_matches_sequential() {
  let image = half_red_half_blue();
  let pipeline = PetPipeline::new(
    FixedDetector::new(four_dogs()),
    ColorClassifier::default(),
    breed_labels(),
    config(),
  );

  let sequential = pipeline.detect_and_classify(&image, &config()).unwrap();
  let parallel = pipeline
    .detect_and_classify(&image, &config().with_classify_workers(3))
    .unwrap();

  assert_eq!(sequential.len(), 4);
  assert_eq!(sorted_boxes(&sequential), sorted_boxes(&parallel));
  assert_eq!(sequential, parallel);
  assert!(parallel.iter().all(|r| r.breed_label == "shiba"));
}

#[test]
fn test_max_detections_caps_results() {
  let pipeline = PetPipeline::new(
    FixedDetector::new(four_dogs()),
    ColorClassifier::default(),
    breed_labels(),
    config(),
  );
  let detections = pipeline
    .detect(&half_red_half_blue(), &config().with_max_detections(2))
    .unwrap();
  assert_eq!(detections.len(), 2);
}

#[test]
fn test_small_boxes_are_dropped() {
  let rows = vec![[110.0, 60.0, 118.0, 140.0, HIGH, LOW, HIGH]];
  let pipeline = PetPipeline::new(
    FixedDetector::new(rows),
    ColorClassifier::default(),
    breed_labels(),
    config(),
  );
  assert!(pipeline.detect(&half_red_half_blue(), &config()).unwrap().is_empty());
  assert_eq!(
    pipeline
      .detect(&half_red_half_blue(), &config().with_min_box_side(4.0))
      .unwrap()
      .len(),
    1
  );
}

#[test]
fn test_small_box_does_not_suppress_overlapping_valid_box() {
  // 两个框 IoU = 11/13：较窄的置信度更高，但宽度低于 min_box_side
  let rows = vec![
    [110.0, 60.0, 121.0, 140.0, HIGH, LOW, HIGH],
    [110.0, 60.0, 123.0, 140.0, 2.0, LOW, HIGH],
  ];
  let pipeline = PetPipeline::new(
    FixedDetector::new(rows),
    ColorClassifier::default(),
    breed_labels(),
    config(),
  );

  let detections = pipeline.detect(&half_red_half_blue(), &config()).unwrap();
  assert_eq!(detections.len(), 1);
  assert_box_near(&detections[0].bbox, &BoundingBox::new(110.0, 10.0, 123.0, 90.0));
}

#[test]
fn test_out_of_range_call_config_is_rejected() {
  let pipeline = PetPipeline::new(
    FixedDetector::new(cat_and_dog_rows()),
    ColorClassifier::default(),
    breed_labels(),
    config(),
  );
  let result = pipeline.detect_and_classify(&half_red_half_blue(), &config().with_nms_iou_threshold(1.5));
  assert!(matches!(result, Err(PipelineError::InvalidInput(_))));
}

#[test]
fn test_low_breed_probability_is_dropped() {
  let pipeline = PetPipeline::new(
    FixedDetector::new(cat_and_dog_rows()),
    ColorClassifier::default(),
    breed_labels(),
    config(),
  );
  let results = pipeline
    .detect_and_classify(&half_red_half_blue(), &config().with_min_breed_probability(0.99))
    .unwrap();
  assert!(results.is_empty());
}

#[test]
fn test_target_labels_filter_detections() {
  let pipeline = PetPipeline::new(
    FixedDetector::new(cat_and_dog_rows()),
    ColorClassifier::default(),
    breed_labels(),
    config(),
  );
  let config = config().with_target_labels(["cat"]);

  let detections = pipeline.detect(&half_red_half_blue(), &config).unwrap();
  assert_eq!(detections.len(), 1);
  assert_eq!(detections[0].label, "cat");
  assert!(pipeline.detect_and_classify(&half_red_half_blue(), &config).unwrap().is_empty());
}

#[test]
fn test_model_infer_uses_stored_config() {
  let pipeline = PetPipeline::new(
    FixedDetector::new(cat_and_dog_rows()),
    ColorClassifier::default(),
    breed_labels(),
    config(),
  );
  let results = pipeline.infer(&half_red_half_blue()).unwrap();
  assert_eq!(results.len(), 1);
  assert_eq!(results[0].breed_label, "shiba");
}

#[test]
fn test_validate_checks_declared_input_shape() {
  let mut detector = FixedDetector::new(cat_and_dog_rows());
  detector.input_shape = Some(vec![1, 200, 200, 3]);
  let pipeline = PetPipeline::new(detector, ColorClassifier::default(), breed_labels(), config());
  assert!(pipeline.validate().is_ok());

  let mut detector = FixedDetector::new(cat_and_dog_rows());
  detector.input_shape = Some(vec![1, 3, 640, 640]);
  let pipeline = PetPipeline::new(detector, ColorClassifier::default(), breed_labels(), config());
  assert!(matches!(pipeline.validate(), Err(PipelineError::InvalidInput(_))));
}
