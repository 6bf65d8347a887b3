// 该文件是 PetLens （宠物之眼） 项目的一部分。
// src/output.rs - 结果输出
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

use serde_json::{Value, json};
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::PixelBuffer, pipeline::ClassificationResult};

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

mod stdout_output;
pub use self::stdout_output::{StdoutOutput, StdoutOutputError};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("标准输出错误: {0}")]
  StdoutOutputError(#[from] StdoutOutputError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 单帧结果的 JSON 表示
pub fn results_to_json(frame: &PixelBuffer, results: &[ClassificationResult]) -> Value {
  let detections = results
    .iter()
    .map(|r| {
      let bbox = &r.detection.bbox;
      json!({
        "label": r.detection.label,
        "class_id": r.detection.class_id,
        "confidence": r.detection.confidence,
        "bbox": [bbox.left, bbox.top, bbox.right, bbox.bottom],
        "breed": {
          "index": r.breed_index,
          "label": r.breed_label,
          "probability": r.breed_probability,
        },
      })
    })
    .collect::<Vec<_>>();

  json!({
    "width": frame.width(),
    "height": frame.height(),
    "detections": detections,
  })
}

pub enum OutputWrapper {
  Stdout(StdoutOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      StdoutOutput::SCHEME => Ok(OutputWrapper::Stdout(StdoutOutput::from_url(url)?)),
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      scheme => Err(OutputError::SchemeMismatch(scheme.to_string())),
    }
  }
}

impl Render<PixelBuffer, Vec<ClassificationResult>> for OutputWrapper {
  type Error = OutputError;

  fn render_result(
    &self,
    frame: &PixelBuffer,
    result: &Vec<ClassificationResult>,
  ) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Stdout(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }
}
