// 该文件是 PetLens （宠物之眼） 项目的一部分。
// src/postprocess.rs - 后处理：检测框、解码、非极大值抑制、坐标反投影
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

mod decode;
mod nms;
mod project;

pub use self::decode::{BoxEncoding, DetectionDecoder, OutputLayout};
pub use self::nms::non_max_suppression;

/// 角点形式的检测框 `[left, top, right, bottom]`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
  pub left: f32,
  pub top: f32,
  pub right: f32,
  pub bottom: f32,
}

impl BoundingBox {
  pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
    Self {
      left,
      top,
      right,
      bottom,
    }
  }

  /// 由中心点和宽高构造
  pub fn from_xywh(cx: f32, cy: f32, w: f32, h: f32) -> Self {
    Self {
      left: cx - w / 2.0,
      top: cy - h / 2.0,
      right: cx + w / 2.0,
      bottom: cy + h / 2.0,
    }
  }

  pub fn width(&self) -> f32 {
    (self.right - self.left).max(0.0)
  }

  pub fn height(&self) -> f32 {
    (self.bottom - self.top).max(0.0)
  }

  pub fn area(&self) -> f32 {
    self.width() * self.height()
  }

  /// `right > left` 且 `bottom > top`
  pub fn is_valid(&self) -> bool {
    self.right > self.left && self.bottom > self.top
  }

  pub fn intersection(&self, other: &BoundingBox) -> f32 {
    let x1 = self.left.max(other.left);
    let y1 = self.top.max(other.top);
    let x2 = self.right.min(other.right);
    let y2 = self.bottom.min(other.bottom);
    (x2 - x1).max(0.0) * (y2 - y1).max(0.0)
  }

  /// 交并比；任一框面积为 0 时为 0
  pub fn iou(&self, other: &BoundingBox) -> f32 {
    let area_a = self.area();
    let area_b = other.area();
    if area_a <= 0.0 || area_b <= 0.0 {
      return 0.0;
    }

    let intersection = self.intersection(other);
    let union = area_a + area_b - intersection;
    if union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }
}

/// 可参与非极大值抑制的检测结果
pub trait Scored {
  fn score(&self) -> f32;
  fn bbox(&self) -> &BoundingBox;
}

/// 解码后、抑制前的候选框，坐标位于信箱画布空间
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
  pub class_id: usize,
  pub objectness: f32,
  pub class_score: f32,
  /// objectness × class_score
  pub confidence: f32,
  pub bbox: BoundingBox,
}

impl Scored for RawDetection {
  fn score(&self) -> f32 {
    self.confidence
  }

  fn bbox(&self) -> &BoundingBox {
    &self.bbox
  }
}

/// 最终检测结果，坐标位于原图空间
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub label: String,
  pub class_id: usize,
  pub confidence: f32,
  pub bbox: BoundingBox,
}

impl Scored for Detection {
  fn score(&self) -> f32 {
    self.confidence
  }

  fn bbox(&self) -> &BoundingBox {
    &self.bbox
  }
}
