// 该文件是 PetLens （宠物之眼） 项目的一部分。
// src/classify.rs - 品种分类
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

use tracing::debug;

use crate::{
  error::PipelineError,
  frame::PixelBuffer,
  model::{InferenceSession, LabelTable},
  pipeline::Stage,
  preprocess::TensorEncoder,
};

/// 数值稳定的 softmax：先减去最大值再取指数
pub fn softmax(logits: &[f32]) -> Vec<f32> {
  let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
  let exps = logits.iter().map(|l| (l - max).exp()).collect::<Vec<_>>();
  let sum = exps.iter().sum::<f32>();
  exps.into_iter().map(|e| e / sum).collect()
}

/// 最大 logit 的下标及其 softmax 概率
pub fn argmax_softmax(logits: &[f32]) -> Result<(usize, f32), PipelineError> {
  if logits.is_empty() {
    return Err(PipelineError::invalid("分类输出为空"));
  }

  let probs = softmax(logits);
  let (index, probability) = probs
    .iter()
    .copied()
    .enumerate()
    .fold((0, f32::NAN), |best, (i, p)| if best.1.is_nan() || p > best.1 { (i, p) } else { best });
  if !probability.is_finite() {
    return Err(PipelineError::invalid(format!("分类输出无法归一化: {} 个 logits 含非有限值", logits.len())));
  }
  Ok((index, probability))
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreedPrediction {
  pub index: usize,
  pub label: String,
  pub probability: f32,
}

/// 第二阶段分类器：对单个裁剪图像给出品种
pub struct BreedClassifier<S> {
  session: S,
  labels: LabelTable,
}

impl<S: InferenceSession> BreedClassifier<S> {
  pub fn new(session: S, labels: LabelTable) -> Self {
    Self { session, labels }
  }

  pub fn session(&self) -> &S {
    &self.session
  }

  pub fn labels(&self) -> &LabelTable {
    &self.labels
  }

  pub fn classify(
    &self,
    crop: &PixelBuffer,
    encoder: &TensorEncoder,
  ) -> Result<BreedPrediction, PipelineError> {
    let input = encoder.encode(crop)?;
    let output = self
      .session
      .run(&input)
      .map_err(|e| PipelineError::inference(Stage::Classify, e))?;

    // [1, K] 或 [K]，按行优先展平
    let logits = output.iter().copied().collect::<Vec<_>>();
    let (index, probability) = argmax_softmax(&logits)?;
    let label = self.labels.label_or_unknown(index).to_string();
    debug!("分类结果: {} ({}) p={:.3}", label, index, probability);

    Ok(BreedPrediction {
      index,
      label,
      probability,
    })
  }
}
