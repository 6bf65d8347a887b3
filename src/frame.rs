// 该文件是 PetLens （宠物之眼） 项目的一部分。
// src/frame.rs - 像素缓冲区定义
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

use image::{ImageBuffer, Rgb, RgbImage, RgbaImage};

use crate::error::PipelineError;

pub const RGB_CHANNELS: usize = 3;
pub const RGBA_CHANNELS: usize = 4;

/// 已解码的图像：行优先、通道交错的 RGB 或 RGBA 字节
///
/// 缓冲区由调用方持有，流水线只读。宽或高为 0 的缓冲区可以构造，
/// 但会在进入流水线时被拒绝。
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
  width: u32,
  height: u32,
  channels: usize,
  data: Box<[u8]>,
}

impl PixelBuffer {
  pub fn new(
    width: u32,
    height: u32,
    channels: usize,
    data: Vec<u8>,
  ) -> Result<Self, PipelineError> {
    if channels != RGB_CHANNELS && channels != RGBA_CHANNELS {
      return Err(PipelineError::invalid(format!(
        "不支持的通道数: {}",
        channels
      )));
    }

    let expected = width as usize * height as usize * channels;
    if data.len() != expected {
      return Err(PipelineError::invalid(format!(
        "数据长度不匹配: 期望长度 {}, 实际长度 {}",
        expected,
        data.len()
      )));
    }

    Ok(Self {
      width,
      height,
      channels,
      data: data.into_boxed_slice(),
    })
  }

  pub fn rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self, PipelineError> {
    Self::new(width, height, RGB_CHANNELS, data)
  }

  pub fn rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self, PipelineError> {
    Self::new(width, height, RGBA_CHANNELS, data)
  }

  /// 纯色 RGB 图像
  pub fn filled(width: u32, height: u32, color: [u8; 3]) -> Self {
    let data = color
      .iter()
      .copied()
      .cycle()
      .take(width as usize * height as usize * RGB_CHANNELS)
      .collect::<Vec<_>>();
    Self {
      width,
      height,
      channels: RGB_CHANNELS,
      data: data.into_boxed_slice(),
    }
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn channels(&self) -> usize {
    self.channels
  }

  pub fn data(&self) -> &[u8] {
    &self.data
  }

  /// 宽或高为 0
  pub fn is_empty(&self) -> bool {
    self.width == 0 || self.height == 0
  }

  /// 读取一个像素的 RGB 分量，alpha 通道被忽略
  pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
    let idx = (y as usize * self.width as usize + x as usize) * self.channels;
    [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
  }

  /// 截取子区域，调用方保证区域位于图像之内
  pub fn region(&self, x: u32, y: u32, width: u32, height: u32) -> PixelBuffer {
    let row_bytes = width as usize * self.channels;
    let mut data = Vec::with_capacity(row_bytes * height as usize);
    for row in y..y + height {
      let start = (row as usize * self.width as usize + x as usize) * self.channels;
      data.extend_from_slice(&self.data[start..start + row_bytes]);
    }

    PixelBuffer {
      width,
      height,
      channels: self.channels,
      data: data.into_boxed_slice(),
    }
  }

  /// 转为 RGB 图像，alpha 通道被丢弃
  pub fn to_rgb_image(&self) -> RgbImage {
    ImageBuffer::from_fn(self.width, self.height, |x, y| Rgb(self.pixel(x, y)))
  }
}

impl From<RgbImage> for PixelBuffer {
  fn from(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width,
      height,
      channels: RGB_CHANNELS,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}

impl From<RgbaImage> for PixelBuffer {
  fn from(image: RgbaImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width,
      height,
      channels: RGBA_CHANNELS,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}
