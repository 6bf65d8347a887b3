// 该文件是 PetLens （宠物之眼） 项目的一部分。
// src/preprocess/tensor.rs - 像素到输入张量的编码
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

use image::imageops;
use ndarray::Array4;

use crate::{error::PipelineError, frame::PixelBuffer, model::Tensor};

const RGB_CHANNELS: usize = 3;

/// 输入张量的维度顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TensorLayout {
  /// `[1, 3, H, W]`
  #[default]
  Nchw,
  /// `[1, H, W, 3]`
  Nhwc,
}

impl TensorLayout {
  /// 根据模型声明的输入形状判断布局和（正方形）输入尺寸
  ///
  /// `[1, 3, 640, 640]` 为 NCHW，`[1, 640, 640, 3]` 为 NHWC；
  /// 动态维度（负数）或非 4 维形状返回 `None`。
  pub fn from_input_shape(shape: &[i64]) -> Option<(TensorLayout, u32)> {
    if shape.len() != 4 {
      return None;
    }
    let (layout, size) = if shape[1] == RGB_CHANNELS as i64 {
      (TensorLayout::Nchw, shape[2])
    } else if shape[3] == RGB_CHANNELS as i64 {
      (TensorLayout::Nhwc, shape[1])
    } else {
      return None;
    };
    u32::try_from(size).ok().filter(|s| *s > 0).map(|s| (layout, s))
  }
}

impl FromStr for TensorLayout {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "nchw" => Ok(TensorLayout::Nchw),
      "nhwc" => Ok(TensorLayout::Nhwc),
      other => Err(format!("未知的张量布局: {}", other)),
    }
  }
}

/// 按通道的均值/标准差归一化
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
  pub mean: [f32; 3],
  pub std: [f32; 3],
}

impl Normalization {
  pub const IMAGENET: Normalization = Normalization {
    mean: [0.485, 0.456, 0.406],
    std: [0.229, 0.224, 0.225],
  };
}

/// 把像素缓冲区编码为模型输入张量
///
/// 缓冲区尺寸与 `size` 不一致时先拉伸到 `size × size`。
/// 默认数值为 `v / 255`，提供归一化参数时为 `(v / 255 - mean) / std`。
#[derive(Debug, Clone, PartialEq)]
pub struct TensorEncoder {
  size: u32,
  layout: TensorLayout,
  normalization: Option<Normalization>,
}

impl TensorEncoder {
  pub fn new(size: u32) -> Self {
    Self {
      size,
      layout: TensorLayout::default(),
      normalization: None,
    }
  }

  pub fn with_layout(mut self, layout: TensorLayout) -> Self {
    self.layout = layout;
    self
  }

  pub fn with_normalization(mut self, normalization: Option<Normalization>) -> Self {
    self.normalization = normalization;
    self
  }

  pub fn size(&self) -> u32 {
    self.size
  }

  pub fn layout(&self) -> TensorLayout {
    self.layout
  }

  pub fn shape(&self) -> [usize; 4] {
    let s = self.size as usize;
    match self.layout {
      TensorLayout::Nchw => [1, RGB_CHANNELS, s, s],
      TensorLayout::Nhwc => [1, s, s, RGB_CHANNELS],
    }
  }

  pub fn encode(&self, buffer: &PixelBuffer) -> Result<Tensor, PipelineError> {
    if buffer.is_empty() {
      return Err(PipelineError::invalid(format!(
        "无法编码空图像: {}x{}",
        buffer.width(),
        buffer.height()
      )));
    }
    if self.size == 0 {
      return Err(PipelineError::invalid("张量尺寸不能为 0"));
    }

    let rgb = buffer.to_rgb_image();
    let image = if rgb.width() == self.size && rgb.height() == self.size {
      rgb
    } else {
      imageops::resize(&rgb, self.size, self.size, imageops::FilterType::Triangle)
    };

    let mut tensor = Array4::<f32>::zeros(self.shape());
    for (x, y, pixel) in image.enumerate_pixels() {
      let (x, y) = (x as usize, y as usize);
      for c in 0..RGB_CHANNELS {
        let value = self.scale_value(pixel[c], c);
        match self.layout {
          TensorLayout::Nchw => tensor[[0, c, y, x]] = value,
          TensorLayout::Nhwc => tensor[[0, y, x, c]] = value,
        }
      }
    }

    Ok(tensor.into_dyn())
  }

  fn scale_value(&self, value: u8, channel: usize) -> f32 {
    let v = value as f32 / 255.0;
    match &self.normalization {
      Some(norm) => (v - norm.mean[channel]) / norm.std[channel],
      None => v,
    }
  }
}
