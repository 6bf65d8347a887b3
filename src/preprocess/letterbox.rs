// 该文件是 PetLens （宠物之眼） 项目的一部分。
// src/preprocess/letterbox.rs - 信箱缩放
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

use image::{RgbImage, imageops};
use tracing::debug;

use crate::{error::PipelineError, frame::PixelBuffer};

/// 原图与信箱画布之间的仿射映射
///
/// `scale = min(S / w, S / h)`，`pad = (S - trunc(dim * scale)) / 2`。
/// 这些值原样保留用于坐标反投影，不做任何取整。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxGeometry {
  pub scale: f32,
  pub pad_x: f32,
  pub pad_y: f32,
  pub source_width: u32,
  pub source_height: u32,
  pub target_size: u32,
}

impl LetterboxGeometry {
  pub fn new(source_width: u32, source_height: u32, target_size: u32) -> Result<Self, PipelineError> {
    if source_width == 0 || source_height == 0 {
      return Err(PipelineError::invalid(format!(
        "图像尺寸无效: {}x{}",
        source_width, source_height
      )));
    }
    if target_size == 0 {
      return Err(PipelineError::invalid("信箱目标尺寸不能为 0"));
    }

    let target = target_size as f32;
    let scale = (target / source_width as f32).min(target / source_height as f32);
    let (scaled_w, scaled_h) = scaled_dims(source_width, source_height, scale, target_size);

    Ok(Self {
      scale,
      pad_x: (target_size - scaled_w) as f32 / 2.0,
      pad_y: (target_size - scaled_h) as f32 / 2.0,
      source_width,
      source_height,
      target_size,
    })
  }

  /// 缩放后图像在画布中的尺寸
  pub fn scaled_dims(&self) -> (u32, u32) {
    scaled_dims(
      self.source_width,
      self.source_height,
      self.scale,
      self.target_size,
    )
  }
}

fn scaled_dims(width: u32, height: u32, scale: f32, target_size: u32) -> (u32, u32) {
  // 极端长宽比下较短边可能缩到 0，保证至少 1 像素
  let w = ((width as f32 * scale) as u32).clamp(1, target_size);
  let h = ((height as f32 * scale) as u32).clamp(1, target_size);
  (w, h)
}

/// 信箱缩放结果：`S×S` 的 RGB 画布以及反投影所需的映射
#[derive(Debug, Clone)]
pub struct LetterboxResult {
  pub image: PixelBuffer,
  pub geometry: LetterboxGeometry,
}

/// 等比缩放并居中填充到 `target_size × target_size` 的黑色画布
pub fn letterbox(source: &PixelBuffer, target_size: u32) -> Result<LetterboxResult, PipelineError> {
  let geometry = LetterboxGeometry::new(source.width(), source.height(), target_size)?;
  let (scaled_w, scaled_h) = geometry.scaled_dims();

  let rgb = source.to_rgb_image();
  let resized = if scaled_w == source.width() && scaled_h == source.height() {
    rgb
  } else {
    imageops::resize(&rgb, scaled_w, scaled_h, imageops::FilterType::Triangle)
  };

  // RgbImage::new 以 0 初始化，即黑色背景
  let mut canvas = RgbImage::new(target_size, target_size);
  imageops::replace(
    &mut canvas,
    &resized,
    geometry.pad_x as i64,
    geometry.pad_y as i64,
  );

  debug!(
    "信箱缩放: {}x{} -> {}x{} (画布 {}), scale={:.4}, pad=({:.1}, {:.1})",
    source.width(),
    source.height(),
    scaled_w,
    scaled_h,
    target_size,
    geometry.scale,
    geometry.pad_x,
    geometry.pad_y
  );

  Ok(LetterboxResult {
    image: PixelBuffer::from(canvas),
    geometry,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_geometry_for_wide_image() {
    let geometry = LetterboxGeometry::new(1000, 500, 640).unwrap();
    assert!((geometry.scale - 0.64).abs() < 1e-6);
    assert_eq!(geometry.pad_x, 0.0);
    // 500 * 0.64 = 320，上下各留 160
    assert_eq!(geometry.pad_y, 160.0);
  }

  #[test]
  fn test_geometry_for_tall_image() {
    let geometry = LetterboxGeometry::new(300, 600, 640).unwrap();
    assert!((geometry.scale - 640.0 / 600.0).abs() < 1e-6);
    assert_eq!(geometry.pad_y, 0.0);
    assert_eq!(geometry.pad_x, 160.0);
  }

  #[test]
  fn test_zero_area_is_invalid() {
    let empty = PixelBuffer::rgb(0, 0, Vec::new()).unwrap();
    assert!(matches!(
      letterbox(&empty, 640),
      Err(PipelineError::InvalidInput(_))
    ));
    let flat = PixelBuffer::rgb(4, 0, Vec::new()).unwrap();
    assert!(letterbox(&flat, 640).is_err());
  }

  #[test]
  fn test_zero_target_is_invalid() {
    let buffer = PixelBuffer::filled(4, 4, [1, 2, 3]);
    assert!(letterbox(&buffer, 0).is_err());
  }

  #[test]
  fn test_canvas_is_square_with_black_padding() {
    let buffer = PixelBuffer::filled(40, 20, [200, 100, 50]);
    let result = letterbox(&buffer, 40).unwrap();

    assert_eq!(result.image.width(), 40);
    assert_eq!(result.image.height(), 40);
    assert_eq!(result.geometry.pad_y, 10.0);
    // 填充区域为黑色
    assert_eq!(result.image.pixel(20, 0), [0, 0, 0]);
    assert_eq!(result.image.pixel(20, 39), [0, 0, 0]);
    // 内容区域保留原色
    assert_eq!(result.image.pixel(20, 20), [200, 100, 50]);
  }

  #[test]
  fn test_extreme_aspect_keeps_one_pixel() {
    let buffer = PixelBuffer::filled(1, 4000, [9, 9, 9]);
    let result = letterbox(&buffer, 64).unwrap();
    let (scaled_w, scaled_h) = result.geometry.scaled_dims();
    assert_eq!(scaled_w, 1);
    assert!((63..=64).contains(&scaled_h));
    assert!(result.geometry.pad_x < 64.0);
    assert_eq!(result.image.width(), 64);
  }
}
