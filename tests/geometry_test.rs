use petlens::{
  PixelBuffer,
  postprocess::{BoundingBox, non_max_suppression},
  preprocess::{LetterboxGeometry, crop_with_margin, letterbox},
};

const SIZES: [(u32, u32); 8] = [
  (1000, 500),
  (500, 1000),
  (640, 640),
  (1, 1),
  (3, 1000),
  (1280, 720),
  (37, 91),
  (4032, 3024),
];

#[test]
fn test_letterbox_geometry_properties() {
  for target in [224u32, 320, 640] {
    for (w, h) in SIZES {
      let geometry = LetterboxGeometry::new(w, h, target).unwrap();
      let expected_scale = (target as f32 / w as f32).min(target as f32 / h as f32);
      assert_eq!(geometry.scale, expected_scale, "{}x{} -> {}", w, h, target);
      assert!(geometry.pad_x >= 0.0 && geometry.pad_x < target as f32);
      assert!(geometry.pad_y >= 0.0 && geometry.pad_y < target as f32);

      // 画布四角反投影后落在原图范围内
      let canvas = BoundingBox::new(0.0, 0.0, target as f32, target as f32);
      let back = geometry.back_project(&canvas);
      assert!(back.left >= 0.0 && back.top >= 0.0);
      assert!(back.right <= (w - 1) as f32 && back.bottom <= (h - 1) as f32);
    }
  }
}

#[test]
fn test_round_trip_within_one_pixel() {
  for (w, h) in SIZES {
    if w < 4 || h < 4 {
      continue;
    }
    let geometry = LetterboxGeometry::new(w, h, 640).unwrap();
    let original = BoundingBox::new(w as f32 * 0.1, h as f32 * 0.2, w as f32 * 0.7, h as f32 * 0.9);
    let restored = geometry.back_project(&geometry.project_to_canvas(&original));

    for (a, e) in [
      (restored.left, original.left),
      (restored.top, original.top),
      (restored.right, original.right),
      (restored.bottom, original.bottom),
    ] {
      assert!((a - e).abs() <= 1.0, "{}x{}: {:?} vs {:?}", w, h, restored, original);
    }
  }
}

#[test]
fn test_letterbox_output_is_square_and_centered() {
  let source = PixelBuffer::filled(300, 150, [200, 100, 50]);
  let boxed = letterbox(&source, 64).unwrap();

  assert_eq!((boxed.image.width(), boxed.image.height()), (64, 64));
  assert_eq!(boxed.image.channels(), 3);
  // 上下填充为黑色，中间为原图颜色
  assert_eq!(boxed.image.pixel(32, 0), [0, 0, 0]);
  assert_eq!(boxed.image.pixel(32, 63), [0, 0, 0]);
  assert_eq!(boxed.image.pixel(32, 32), [200, 100, 50]);
}

#[test]
fn test_rgba_input_drops_alpha() {
  let data = [10u8, 20, 30, 0].repeat(8 * 8);
  let source = PixelBuffer::rgba(8, 8, data).unwrap();
  let boxed = letterbox(&source, 8).unwrap();
  assert_eq!(boxed.image.channels(), 3);
  assert_eq!(boxed.image.pixel(4, 4), [10, 20, 30]);
}

#[test]
fn test_crop_of_back_projected_box_stays_inside() {
  let source = PixelBuffer::filled(1000, 500, [1, 1, 1]);
  let boxed = letterbox(&source, 640).unwrap();
  let bbox = boxed.back_project(&BoundingBox::new(-50.0, 100.0, 700.0, 600.0));

  let crop = crop_with_margin(&source, &bbox, 0.2).unwrap();
  assert!(crop.width() >= 1 && crop.width() <= 1000);
  assert!(crop.height() >= 1 && crop.height() <= 500);
}

#[test]
fn test_nms_scenario() {
  #[derive(Debug, Clone, PartialEq)]
  struct ScoredBox(BoundingBox, f32);

  impl petlens::postprocess::Scored for ScoredBox {
    fn score(&self) -> f32 {
      self.1
    }

    fn bbox(&self) -> &BoundingBox {
      &self.0
    }
  }

  let boxes = vec![
    ScoredBox(BoundingBox::new(0.0, 0.0, 100.0, 100.0), 0.9),
    ScoredBox(BoundingBox::new(10.0, 10.0, 110.0, 110.0), 0.7),
  ];
  let kept = non_max_suppression(boxes, 0.45);
  assert_eq!(kept.len(), 1);
  assert_eq!(kept[0].1, 0.9);
}
