// 该文件是 PetLens （宠物之眼） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 推理后端
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

use std::sync::Mutex;

use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::{Value, ValueType},
};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{InferenceSession, ModelLoader, Tensor};

#[derive(Error, Debug)]
pub enum OnnxSessionError {
  #[error("ONNX Runtime 错误: {0}")]
  Runtime(String),
  #[error("模型应只有 1 个输入和 1 个输出, 实际为 {inputs} 个输入, {outputs} 个输出")]
  Arity { inputs: usize, outputs: usize },
  #[error("会话锁已损坏")]
  Poisoned,
}

impl OnnxSessionError {
  fn runtime(err: impl std::fmt::Display) -> Self {
    OnnxSessionError::Runtime(err.to_string())
  }
}

/// 从内存中的模型字节创建 ONNX Runtime 会话
#[derive(Debug, Clone)]
pub struct OnnxLoader {
  intra_threads: usize,
}

impl Default for OnnxLoader {
  fn default() -> Self {
    Self { intra_threads: 4 }
  }
}

impl OnnxLoader {
  pub fn with_intra_threads(mut self, intra_threads: usize) -> Self {
    self.intra_threads = intra_threads.max(1);
    self
  }
}

impl ModelLoader for OnnxLoader {
  type Session = OnnxSession;
  type Error = OnnxSessionError;

  fn load(&self, model: &[u8]) -> Result<Self::Session, Self::Error> {
    let session = Session::builder()
      .map_err(OnnxSessionError::runtime)?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(OnnxSessionError::runtime)?
      .with_intra_threads(self.intra_threads)
      .map_err(OnnxSessionError::runtime)?
      .commit_from_memory(model)
      .map_err(OnnxSessionError::runtime)?;

    OnnxSession::new(session)
  }
}

/// 单输入单输出的 ONNX 模型会话
///
/// `ort` 的 `run` 需要独占会话，这里用互斥锁串行化同一会话上的推理；
/// 输入输出的名字和形状在加载时读取一次。
pub struct OnnxSession {
  session: Mutex<Session>,
  input_name: String,
  output_name: String,
  input_shape: Vec<i64>,
  output_shape: Vec<i64>,
}

fn tensor_shape(value_type: &ValueType) -> Vec<i64> {
  match value_type {
    ValueType::Tensor { shape, .. } => shape.to_vec(),
    _ => Vec::new(),
  }
}

impl OnnxSession {
  pub fn new(session: Session) -> Result<Self, OnnxSessionError> {
    if session.inputs.len() != 1 || session.outputs.is_empty() {
      return Err(OnnxSessionError::Arity {
        inputs: session.inputs.len(),
        outputs: session.outputs.len(),
      });
    }

    let input_name = session.inputs[0].name.clone();
    let output_name = session.outputs[0].name.clone();
    let input_shape = tensor_shape(&session.inputs[0].input_type);
    let output_shape = tensor_shape(&session.outputs[0].output_type);
    info!(
      "ONNX 会话: 输入 {} {:?}, 输出 {} {:?}",
      input_name, input_shape, output_name, output_shape
    );

    Ok(Self {
      session: Mutex::new(session),
      input_name,
      output_name,
      input_shape,
      output_shape,
    })
  }

  pub fn input_name(&self) -> &str {
    &self.input_name
  }

  pub fn output_name(&self) -> &str {
    &self.output_name
  }
}

impl InferenceSession for OnnxSession {
  type Error = OnnxSessionError;

  fn run(&self, input: &Tensor) -> Result<Tensor, Self::Error> {
    let input_value = Value::from_array(input.clone()).map_err(OnnxSessionError::runtime)?;

    let mut session = self.session.lock().map_err(|_| OnnxSessionError::Poisoned)?;
    let outputs = session
      .run(ort::inputs![self.input_name.as_str() => &input_value])
      .map_err(OnnxSessionError::runtime)?;

    let output = outputs[self.output_name.as_str()]
      .try_extract_array::<f32>()
      .map_err(OnnxSessionError::runtime)?
      .to_owned();
    debug!("推理输出形状: {:?}", output.shape());

    Ok(output)
  }

  fn input_shape(&self) -> Option<&[i64]> {
    (!self.input_shape.is_empty()).then_some(self.input_shape.as_slice())
  }

  fn output_shape(&self) -> Option<&[i64]> {
    (!self.output_shape.is_empty()).then_some(self.output_shape.as_slice())
  }
}
