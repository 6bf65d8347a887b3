// 该文件是 PetLens （宠物之眼） 项目的一部分。
// src/error.rs - 流水线错误定义
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

use thiserror::Error;

use crate::pipeline::Stage;

/// 流水线错误
///
/// 错误可以被克隆：加载失败的资源会把错误缓存下来，之后每次访问都返回同一个错误。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
  /// 输入无效（零面积图像、张量形状错误等），整个调用终止
  #[error("输入无效: {0}")]
  InvalidInput(String),
  /// 推理运行时执行模型失败
  #[error("模型推理失败 [{stage}]: {message}")]
  ModelInference { stage: Stage, message: String },
  /// 模型文件或标签文件加载失败
  #[error("资源加载失败 [{asset}]: {message}")]
  AssetLoad { asset: String, message: String },
}

impl PipelineError {
  pub fn invalid(msg: impl Into<String>) -> Self {
    PipelineError::InvalidInput(msg.into())
  }

  pub fn inference(stage: Stage, err: impl std::fmt::Display) -> Self {
    PipelineError::ModelInference {
      stage,
      message: err.to_string(),
    }
  }

  pub fn asset(asset: impl Into<String>, err: impl std::fmt::Display) -> Self {
    PipelineError::AssetLoad {
      asset: asset.into(),
      message: err.to_string(),
    }
  }
}
