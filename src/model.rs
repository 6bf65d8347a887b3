// 该文件是 PetLens （宠物之眼） 项目的一部分。
// src/model.rs - 模型与推理运行时边界
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

use std::sync::Arc;

pub mod cache;
pub mod labels;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use self::cache::{LazyAsset, ModelRegistry, load_model_file};
pub use self::labels::{LabelError, LabelTable, UNKNOWN_LABEL};

/// 模型输入输出张量
pub type Tensor = ndarray::ArrayD<f32>;

/// 一次完整的推理：输入一帧，得到该帧的结果
pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 推理运行时会话：给定输入张量，返回输出张量
///
/// 会话在初始化后不再修改，`run` 只需要共享引用，可被多个线程同时调用。
/// 运行时本身需要独占访问时，由实现者在内部加锁。
pub trait InferenceSession: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn run(&self, input: &Tensor) -> Result<Tensor, Self::Error>;

  /// 模型声明的输入形状，动态维度为负数
  fn input_shape(&self) -> Option<&[i64]> {
    None
  }

  /// 模型声明的输出形状，动态维度为负数
  fn output_shape(&self) -> Option<&[i64]> {
    None
  }
}

impl<S: InferenceSession + ?Sized> InferenceSession for &S {
  type Error = S::Error;

  fn run(&self, input: &Tensor) -> Result<Tensor, Self::Error> {
    (**self).run(input)
  }

  fn input_shape(&self) -> Option<&[i64]> {
    (**self).input_shape()
  }

  fn output_shape(&self) -> Option<&[i64]> {
    (**self).output_shape()
  }
}

impl<S: InferenceSession + ?Sized> InferenceSession for Arc<S> {
  type Error = S::Error;

  fn run(&self, input: &Tensor) -> Result<Tensor, Self::Error> {
    (**self).run(input)
  }

  fn input_shape(&self) -> Option<&[i64]> {
    (**self).input_shape()
  }

  fn output_shape(&self) -> Option<&[i64]> {
    (**self).output_shape()
  }
}

/// 从模型字节创建推理会话
pub trait ModelLoader {
  type Session: InferenceSession;
  type Error: std::fmt::Display;

  fn load(&self, model: &[u8]) -> Result<Self::Session, Self::Error>;
}
