// 该文件是 PetLens （宠物之眼） 项目的一部分。
// src/postprocess/project.rs - 信箱坐标与原图坐标的相互映射
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use crate::{
  postprocess::BoundingBox,
  preprocess::{LetterboxGeometry, LetterboxResult},
};

impl LetterboxGeometry {
  /// 信箱画布坐标 -> 原图坐标
  ///
  /// `orig = (tensor - pad) / scale`，两个角点都限制在 `[0, 原图尺寸 - 1]` 内，
  /// 即使检测框越出了有效区域也不会超出原图。
  pub fn back_project(&self, bbox: &BoundingBox) -> BoundingBox {
    let max_x = self.source_width.saturating_sub(1) as f32;
    let max_y = self.source_height.saturating_sub(1) as f32;
    let x = |v: f32| ((v - self.pad_x) / self.scale).clamp(0.0, max_x);
    let y = |v: f32| ((v - self.pad_y) / self.scale).clamp(0.0, max_y);

    BoundingBox::new(x(bbox.left), y(bbox.top), x(bbox.right), y(bbox.bottom))
  }

  /// 原图坐标 -> 信箱画布坐标
  pub fn project_to_canvas(&self, bbox: &BoundingBox) -> BoundingBox {
    let x = |v: f32| v * self.scale + self.pad_x;
    let y = |v: f32| v * self.scale + self.pad_y;

    BoundingBox::new(x(bbox.left), y(bbox.top), x(bbox.right), y(bbox.bottom))
  }
}

impl LetterboxResult {
  pub fn back_project(&self, bbox: &BoundingBox) -> BoundingBox {
    self.geometry.back_project(bbox)
  }

  pub fn project_to_canvas(&self, bbox: &BoundingBox) -> BoundingBox {
    self.geometry.project_to_canvas(bbox)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn assert_box_near(actual: &BoundingBox, expected: &BoundingBox, tolerance: f32) {
    let pairs = [
      (actual.left, expected.left),
      (actual.top, expected.top),
      (actual.right, expected.right),
      (actual.bottom, expected.bottom),
    ];
    for (a, e) in pairs {
      assert!(
        (a - e).abs() <= tolerance,
        "{:?} 与 {:?} 相差超过 {}",
        actual,
        expected,
        tolerance
      );
    }
  }

  #[test]
  fn test_back_project_wide_image() {
    let geometry = LetterboxGeometry::new(1000, 500, 640).unwrap();
    let bbox = geometry.back_project(&BoundingBox::new(100.0, 200.0, 300.0, 400.0));
    assert_box_near(&bbox, &BoundingBox::new(156.25, 62.5, 468.75, 375.0), 1e-3);
  }

  #[test]
  fn test_back_project_with_explicit_padding() {
    let geometry = LetterboxGeometry {
      scale: 0.64,
      pad_x: 0.0,
      pad_y: 96.0,
      source_width: 1000,
      source_height: 500,
      target_size: 640,
    };
    let bbox = geometry.back_project(&BoundingBox::new(100.0, 200.0, 300.0, 400.0));
    assert_box_near(&bbox, &BoundingBox::new(156.25, 162.5, 468.75, 475.0), 1e-3);
  }

  #[test]
  fn test_back_project_clamps_to_image() {
    let geometry = LetterboxGeometry::new(1000, 500, 640).unwrap();
    let bbox = geometry.back_project(&BoundingBox::new(-20.0, 0.0, 700.0, 640.0));
    assert_eq!(bbox, BoundingBox::new(0.0, 0.0, 999.0, 499.0));
  }

  #[test]
  fn test_round_trip() {
    let geometry = LetterboxGeometry::new(1280, 720, 640).unwrap();
    let original = BoundingBox::new(100.0, 50.0, 800.0, 600.0);

    let canvas = geometry.project_to_canvas(&original);
    let restored = geometry.back_project(&canvas);
    assert_box_near(&restored, &original, 1.0);
  }
}
