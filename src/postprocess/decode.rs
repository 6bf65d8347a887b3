// 该文件是 PetLens （宠物之眼） 项目的一部分。
// src/postprocess/decode.rs - 检测模型输出解码
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

use std::str::FromStr;

use ndarray::{ArrayView2, Axis, Ix2};
use tracing::debug;

use crate::{
  error::PipelineError,
  model::Tensor,
  postprocess::{BoundingBox, RawDetection},
};

const BOX_PARAMS: usize = 4;

/// 检测框参数的编码方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoxEncoding {
  /// 中心点与宽高 `(cx, cy, w, h)`
  #[default]
  Xywh,
  /// 角点 `(x1, y1, x2, y2)`
  Xyxy,
}

impl FromStr for BoxEncoding {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "xywh" => Ok(BoxEncoding::Xywh),
      "xyxy" => Ok(BoxEncoding::Xyxy),
      other => Err(format!("未知的检测框编码: {}", other)),
    }
  }
}

/// 检测模型输出张量的维度顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputLayout {
  /// `[N, C]`：每行一个候选框
  #[default]
  Nc,
  /// `[C, N]`：每列一个候选框
  Cn,
}

impl OutputLayout {
  /// 根据模型声明的输出形状推断布局（候选框数量大于通道数）
  ///
  /// 可带一个大小为 1 的批次维度，动态维度返回 `None`。
  pub fn infer(shape: &[i64]) -> Option<OutputLayout> {
    let dims = match shape {
      [1, d1, d2] | [d1, d2] => (*d1, *d2),
      _ => return None,
    };
    match dims {
      (d1, d2) if d1 <= 0 || d2 <= 0 => None,
      (d1, d2) if d1 > d2 => Some(OutputLayout::Nc),
      _ => Some(OutputLayout::Cn),
    }
  }
}

impl FromStr for OutputLayout {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "nc" => Ok(OutputLayout::Nc),
      "cn" => Ok(OutputLayout::Cn),
      other => Err(format!("未知的输出布局: {}", other)),
    }
  }
}

/// 检测输出解码器
///
/// 每个候选框依次经过两道阈值：objectness 先过一次，
/// objectness × 最佳类别分数再过一次。
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionDecoder {
  score_threshold: f32,
  box_encoding: BoxEncoding,
  output_layout: OutputLayout,
  has_objectness: bool,
}

impl DetectionDecoder {
  pub fn new(score_threshold: f32) -> Self {
    Self {
      score_threshold,
      box_encoding: BoxEncoding::default(),
      output_layout: OutputLayout::default(),
      has_objectness: true,
    }
  }

  pub fn with_box_encoding(mut self, box_encoding: BoxEncoding) -> Self {
    self.box_encoding = box_encoding;
    self
  }

  pub fn with_output_layout(mut self, output_layout: OutputLayout) -> Self {
    self.output_layout = output_layout;
    self
  }

  /// 关闭后按 YOLOv8/11 的输出解码：`C = 4 + 类别数`，没有 objectness 列
  pub fn with_objectness(mut self, has_objectness: bool) -> Self {
    self.has_objectness = has_objectness;
    self
  }

  /// 每行除类别分数外的通道数
  fn header_len(&self) -> usize {
    if self.has_objectness {
      BOX_PARAMS + 1
    } else {
      BOX_PARAMS
    }
  }

  pub fn decode(&self, output: &Tensor) -> Result<Vec<RawDetection>, PipelineError> {
    let view = squeeze_batch(output)?;
    // [C, N] 只做视图转置，不拷贝数据
    let rows = match self.output_layout {
      OutputLayout::Nc => view,
      OutputLayout::Cn => view.reversed_axes(),
    };

    let channels = rows.ncols();
    let header = self.header_len();
    if channels <= header {
      debug!("输出通道数 {} 不含类别分数，跳过解码", channels);
      return Ok(Vec::new());
    }
    let num_classes = channels - header;

    let mut detections = Vec::new();
    for row in rows.rows() {
      let objectness = if self.has_objectness {
        let objectness = sigmoid(row[BOX_PARAMS]);
        if !(objectness >= self.score_threshold) {
          continue;
        }
        objectness
      } else {
        1.0
      };

      let (class_id, class_score) = {
        let mut best_score = f32::MIN;
        let mut best_idx = 0usize;
        for c in 0..num_classes {
          let score = sigmoid(row[header + c]);
          if score > best_score {
            best_score = score;
            best_idx = c;
          }
        }
        (best_idx, best_score)
      };

      let confidence = objectness * class_score;
      if !(confidence >= self.score_threshold) {
        continue;
      }

      let bbox = match self.box_encoding {
        BoxEncoding::Xywh => BoundingBox::from_xywh(row[0], row[1], row[2], row[3]),
        BoxEncoding::Xyxy => BoundingBox::new(row[0], row[1], row[2], row[3]),
      };

      detections.push(RawDetection {
        class_id,
        objectness,
        class_score,
        confidence,
        bbox,
      });
    }

    debug!(
      "解码 {} 个候选框 ({} 类)，保留 {} 个",
      rows.nrows(),
      num_classes,
      detections.len()
    );

    Ok(detections)
  }
}

/// 去掉大小为 1 的批次维度，得到二维视图
fn squeeze_batch(output: &Tensor) -> Result<ArrayView2<'_, f32>, PipelineError> {
  let shape_error = |e: ndarray::ShapeError| {
    PipelineError::invalid(format!("检测输出形状无效 {:?}: {}", output.shape(), e))
  };

  match output.shape() {
    [_, _] => output.view().into_dimensionality::<Ix2>().map_err(shape_error),
    [1, _, _] => output
      .index_axis(Axis(0), 0)
      .into_dimensionality::<Ix2>()
      .map_err(shape_error),
    shape => Err(PipelineError::invalid(format!(
      "检测输出应为 [N, C]、[C, N] 或带批次维度 1 的三维张量，实际为 {:?}",
      shape
    ))),
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}
