// 该文件是 PetLens （宠物之眼） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::{
  collections::VecDeque,
  path::{Path, PathBuf},
};

use image::{ImageReader, imageops::FilterType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::PixelBuffer, url_path};

/// 解码后最长边的上限，更大的照片先等比缩小
pub const MAX_DECODE_SIDE: u32 = 1280;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像解码错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("参数无效: {0}")]
  InvalidQuery(String),
  #[error("目录中没有图像文件: {0}")]
  NoImages(String),
}

/// 解码图像文件，最长边超过 `max_side` 时等比缩小
pub fn decode_image(path: &Path, max_side: u32) -> Result<PixelBuffer, ImageFileInputError> {
  let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
  let (width, height) = (image.width(), image.height());

  let image = if width.max(height) > max_side {
    debug!(
      "图像 {}x{} 超过 {}，等比缩小",
      width, height, max_side
    );
    image.resize(max_side, max_side, FilterType::Triangle)
  } else {
    image
  };

  Ok(PixelBuffer::from(image.into_rgb8()))
}

fn is_image_file(path: &Path) -> bool {
  path.is_file()
    && path
      .extension()
      .and_then(|ext| ext.to_str())
      .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
      .unwrap_or(false)
}

/// 单个图像文件，或目录下的所有图像文件（按文件名排序）
///
/// `image:///photos/dog.jpg`、`image:///photos/?max_side=960`
pub struct ImageFileInput {
  paths: VecDeque<PathBuf>,
  max_side: u32,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemeMismatch);
    }

    let mut input = Self::from_path(url_path(url))?;
    for (key, value) in url.query_pairs() {
      if key == "max_side" {
        let max_side = value
          .parse::<u32>()
          .map_err(|e| ImageFileInputError::InvalidQuery(format!("max_side={}: {}", value, e)))?;
        input = input.with_max_side(max_side);
      }
    }
    Ok(input)
  }
}

impl ImageFileInput {
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();
    let paths = if path.is_dir() {
      let mut files = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| is_image_file(p))
        .collect::<Vec<_>>();
      files.sort();
      if files.is_empty() {
        return Err(ImageFileInputError::NoImages(path.display().to_string()));
      }
      info!("目录 {} 中共 {} 张图像", path.display(), files.len());
      files.into()
    } else {
      // 提前检查文件是否可读
      std::fs::metadata(path)?;
      VecDeque::from([path.to_path_buf()])
    };

    Ok(Self {
      paths,
      max_side: MAX_DECODE_SIDE,
    })
  }

  pub fn with_max_side(mut self, max_side: u32) -> Self {
    self.max_side = max_side.max(1);
    self
  }

  /// 尚未读取的文件数
  pub fn remaining(&self) -> usize {
    self.paths.len()
  }
}

impl Iterator for ImageFileInput {
  type Item = PixelBuffer;

  /// 解码失败的文件记录日志后跳过
  fn next(&mut self) -> Option<Self::Item> {
    while let Some(path) = self.paths.pop_front() {
      match decode_image(&path, self.max_side) {
        Ok(buffer) => {
          info!(
            "读取图像 {} ({}x{})",
            path.display(),
            buffer.width(),
            buffer.height()
          );
          return Some(buffer);
        }
        Err(e) => error!("读取图像 {} 失败: {}", path.display(), e),
      }
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("petlens-input-{}-{}", std::process::id(), name));
    std::fs::create_dir_all(&dir).unwrap();
    dir
  }

  #[test]
  fn test_large_image_is_downscaled() {
    let dir = temp_dir("large");
    let path = dir.join("wide.png");
    RgbImage::new(2000, 1000).save(&path).unwrap();

    let buffer = decode_image(&path, MAX_DECODE_SIDE).unwrap();
    assert_eq!((buffer.width(), buffer.height()), (1280, 640));
  }

  #[test]
  fn test_directory_input_is_sorted_and_skips_broken_files() {
    let dir = temp_dir("directory");
    RgbImage::new(4, 2).save(dir.join("b.png")).unwrap();
    RgbImage::new(3, 3).save(dir.join("a.png")).unwrap();
    std::fs::write(dir.join("c.jpg"), b"not an image").unwrap();
    std::fs::write(dir.join("notes.txt"), b"ignored").unwrap();

    let url = Url::parse(&format!("image://{}", dir.display())).unwrap();
    let input = ImageFileInput::from_url(&url).unwrap();
    assert_eq!(input.remaining(), 3);

    let sizes = input.map(|b| (b.width(), b.height())).collect::<Vec<_>>();
    assert_eq!(sizes, vec![(3, 3), (4, 2)]);
  }

  #[test]
  fn test_scheme_mismatch() {
    let url = Url::parse("folder:///tmp").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemeMismatch)
    ));
  }
}
