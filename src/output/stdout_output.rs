// 该文件是 PetLens （宠物之眼） 项目的一部分。
// src/output/stdout_output.rs - 标准输出
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
  io::Write,
  sync::atomic::{AtomicUsize, Ordering},
};

use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::PixelBuffer,
  output::{Render, results_to_json},
  pipeline::ClassificationResult,
};

#[derive(Error, Debug)]
pub enum StdoutOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 每帧输出一行 JSON：`stdout://`，`stdout://?pretty` 输出缩进格式
pub struct StdoutOutput {
  pretty: bool,
  frame_counter: AtomicUsize,
}

impl FromUrlWithScheme for StdoutOutput {
  const SCHEME: &'static str = "stdout";
}

impl FromUrl for StdoutOutput {
  type Error = StdoutOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(StdoutOutputError::SchemeMismatch);
    }

    Ok(StdoutOutput {
      pretty: url.query_pairs().any(|(k, _)| k == "pretty"),
      frame_counter: AtomicUsize::new(0),
    })
  }
}

impl Render<PixelBuffer, Vec<ClassificationResult>> for StdoutOutput {
  type Error = StdoutOutputError;

  fn render_result(
    &self,
    frame: &PixelBuffer,
    result: &Vec<ClassificationResult>,
  ) -> Result<(), Self::Error> {
    let mut value = results_to_json(frame, result);
    value["frame"] = self.frame_counter.fetch_add(1, Ordering::Relaxed).into();

    let line = if self.pretty {
      serde_json::to_string_pretty(&value)?
    } else {
      serde_json::to_string(&value)?
    };

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", line)?;
    stdout.flush()?;
    Ok(())
  }
}
