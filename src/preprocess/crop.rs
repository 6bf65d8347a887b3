// 该文件是 PetLens （宠物之眼） 项目的一部分。
// src/preprocess/crop.rs - 检测框裁剪
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

use crate::{error::PipelineError, frame::PixelBuffer, postprocess::BoundingBox};

/// 按比例向四周扩展检测框后裁剪原图
///
/// 框在每一侧扩展 `margin × 宽` / `margin × 高`，并限制在图像范围内。
/// 退化的框（面积接近 0）也至少裁出 1×1。
pub fn crop_with_margin(
  source: &PixelBuffer,
  bbox: &BoundingBox,
  margin_ratio: f32,
) -> Result<PixelBuffer, PipelineError> {
  if source.is_empty() {
    return Err(PipelineError::invalid(format!(
      "无法从空图像裁剪: {}x{}",
      source.width(),
      source.height()
    )));
  }

  let (w, h) = (source.width() as f32, source.height() as f32);
  let mx = bbox.width() * margin_ratio;
  let my = bbox.height() * margin_ratio;

  let x1 = (bbox.left - mx).clamp(0.0, w - 1.0);
  let y1 = (bbox.top - my).clamp(0.0, h - 1.0);
  let x2 = (bbox.right + mx).clamp(1.0, w);
  let y2 = (bbox.bottom + my).clamp(1.0, h);

  // NaN 经 `as` 转换为 0
  let x = (x1 as u32).min(source.width() - 1);
  let y = (y1 as u32).min(source.height() - 1);
  let crop_w = ((x2 - x1) as u32).max(1).min(source.width() - x);
  let crop_h = ((y2 - y1) as u32).max(1).min(source.height() - y);

  Ok(source.region(x, y, crop_w, crop_h))
}
