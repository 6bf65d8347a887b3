// 该文件是 PetLens （宠物之眼） 项目的一部分。
// src/pipeline.rs - 检测 + 分类流水线
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

use std::fmt;

use rayon::{ThreadPoolBuilder, prelude::*};
use tracing::{debug, info, warn};

use crate::{
  classify::BreedClassifier,
  error::PipelineError,
  frame::PixelBuffer,
  model::{InferenceSession, LabelTable, Model},
  postprocess::{
    BoxEncoding, Detection, DetectionDecoder, OutputLayout, non_max_suppression,
  },
  preprocess::{Normalization, TensorEncoder, TensorLayout, crop_with_margin, letterbox},
};

const COCO_NUM_CLASSES: usize = 80;

/// 流水线阶段，出现在日志和错误信息中
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Idle,
  LetterboxAndEncode,
  Detect,
  DecodeAndSuppress,
  BackProject,
  Crop,
  Encode,
  Classify,
  Done,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Stage::Idle => "idle",
      Stage::LetterboxAndEncode => "letterbox+encode",
      Stage::Detect => "detect",
      Stage::DecodeAndSuppress => "decode+nms",
      Stage::BackProject => "back-project",
      Stage::Crop => "crop",
      Stage::Encode => "encode",
      Stage::Classify => "classify",
      Stage::Done => "done",
    };
    f.write_str(name)
  }
}

/// 流水线配置
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
  pub detection_input_size: u32,
  pub classification_input_size: u32,
  pub score_threshold: f32,
  pub nms_iou_threshold: f32,
  pub min_breed_probability: f32,
  pub crop_margin_ratio: f32,
  pub box_encoding: BoxEncoding,
  pub output_layout: OutputLayout,
  pub has_objectness: bool,
  pub detection_layout: TensorLayout,
  pub classification_layout: TensorLayout,
  pub classification_normalization: Option<Normalization>,
  /// 保留的检测类别
  pub target_labels: Vec<String>,
  /// 需要送入品种分类器的检测类别
  pub classify_labels: Vec<String>,
  /// 原图上宽或高小于该值的框被丢弃
  pub min_box_side: f32,
  pub max_detections: usize,
  /// 并行分类的线程数，1 为顺序执行
  pub classify_workers: usize,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      detection_input_size: 640,
      classification_input_size: 224,
      score_threshold: 0.55,
      nms_iou_threshold: 0.5,
      min_breed_probability: 0.30,
      crop_margin_ratio: 0.1,
      box_encoding: BoxEncoding::Xywh,
      output_layout: OutputLayout::Nc,
      has_objectness: true,
      detection_layout: TensorLayout::Nhwc,
      classification_layout: TensorLayout::Nchw,
      classification_normalization: None,
      target_labels: vec!["cat".to_string(), "dog".to_string()],
      classify_labels: vec!["dog".to_string()],
      min_box_side: 12.0,
      max_detections: 30,
      classify_workers: 1,
    }
  }
}

impl PipelineConfig {
  pub fn with_detection_input_size(mut self, size: u32) -> Self {
    self.detection_input_size = size;
    self
  }

  pub fn with_classification_input_size(mut self, size: u32) -> Self {
    self.classification_input_size = size;
    self
  }

  pub fn with_score_threshold(mut self, threshold: f32) -> Self {
    self.score_threshold = threshold;
    self
  }

  pub fn with_nms_iou_threshold(mut self, threshold: f32) -> Self {
    self.nms_iou_threshold = threshold;
    self
  }

  pub fn with_min_breed_probability(mut self, probability: f32) -> Self {
    self.min_breed_probability = probability;
    self
  }

  pub fn with_crop_margin_ratio(mut self, ratio: f32) -> Self {
    self.crop_margin_ratio = ratio;
    self
  }

  pub fn with_box_encoding(mut self, box_encoding: BoxEncoding) -> Self {
    self.box_encoding = box_encoding;
    self
  }

  pub fn with_output_layout(mut self, output_layout: OutputLayout) -> Self {
    self.output_layout = output_layout;
    self
  }

  pub fn with_objectness(mut self, has_objectness: bool) -> Self {
    self.has_objectness = has_objectness;
    self
  }

  pub fn with_detection_layout(mut self, layout: TensorLayout) -> Self {
    self.detection_layout = layout;
    self
  }

  pub fn with_classification_layout(mut self, layout: TensorLayout) -> Self {
    self.classification_layout = layout;
    self
  }

  pub fn with_classification_normalization(mut self, normalization: Option<Normalization>) -> Self {
    self.classification_normalization = normalization;
    self
  }

  pub fn with_target_labels<S: Into<String>>(mut self, labels: impl IntoIterator<Item = S>) -> Self {
    self.target_labels = labels.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_classify_labels<S: Into<String>>(mut self, labels: impl IntoIterator<Item = S>) -> Self {
    self.classify_labels = labels.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_min_box_side(mut self, side: f32) -> Self {
    self.min_box_side = side;
    self
  }

  pub fn with_max_detections(mut self, max_detections: usize) -> Self {
    self.max_detections = max_detections;
    self
  }

  pub fn with_classify_workers(mut self, workers: usize) -> Self {
    self.classify_workers = workers;
    self
  }

  /// 按检测模型声明的形状调整输入布局、输入尺寸与输出布局
  ///
  /// 形状未知或含动态维度的部分保持不变。
  pub fn adapt_to_detector(mut self, input_shape: Option<&[i64]>, output_shape: Option<&[i64]>) -> Self {
    if let Some((layout, size)) = input_shape.and_then(TensorLayout::from_input_shape) {
      self.detection_layout = layout;
      self.detection_input_size = size;
    }
    if let Some(layout) = output_shape.and_then(OutputLayout::infer) {
      self.output_layout = layout;
    }
    self
  }

  /// 按分类模型声明的输入形状调整布局与输入尺寸
  pub fn adapt_to_classifier(mut self, input_shape: Option<&[i64]>) -> Self {
    if let Some((layout, size)) = input_shape.and_then(TensorLayout::from_input_shape) {
      self.classification_layout = layout;
      self.classification_input_size = size;
    }
    self
  }

  pub fn decoder(&self) -> DetectionDecoder {
    DetectionDecoder::new(self.score_threshold)
      .with_box_encoding(self.box_encoding)
      .with_output_layout(self.output_layout)
      .with_objectness(self.has_objectness)
  }

  pub fn detection_encoder(&self) -> TensorEncoder {
    TensorEncoder::new(self.detection_input_size).with_layout(self.detection_layout)
  }

  pub fn classification_encoder(&self) -> TensorEncoder {
    TensorEncoder::new(self.classification_input_size)
      .with_layout(self.classification_layout)
      .with_normalization(self.classification_normalization)
  }

  fn is_target(&self, label: &str) -> bool {
    self.target_labels.iter().any(|l| l == label)
  }

  fn should_classify(&self, label: &str) -> bool {
    self.classify_labels.iter().any(|l| l == label)
  }

  /// 检查取值范围，在构造流水线时调用一次
  pub fn validate(&self) -> Result<(), PipelineError> {
    if self.detection_input_size == 0 || self.classification_input_size == 0 {
      return Err(PipelineError::invalid("模型输入尺寸不能为 0"));
    }
    let unit_ranged = [
      ("score_threshold", self.score_threshold),
      ("nms_iou_threshold", self.nms_iou_threshold),
      ("min_breed_probability", self.min_breed_probability),
    ];
    for (name, value) in unit_ranged {
      if !(0.0..=1.0).contains(&value) {
        return Err(PipelineError::invalid(format!(
          "{} 应在 [0, 1] 内, 实际为 {}",
          name, value
        )));
      }
    }
    if !(self.crop_margin_ratio >= 0.0) {
      return Err(PipelineError::invalid(format!(
        "crop_margin_ratio 不能为负数: {}",
        self.crop_margin_ratio
      )));
    }
    Ok(())
  }
}

/// 由检测模型输出形状推断类别数，选择默认检测标签
///
/// 80 类及以上的输出头使用 COCO 标签，其余按 `["cat", "dog"]`。
pub fn default_detection_labels(output_shape: Option<&[i64]>, config: &PipelineConfig) -> LabelTable {
  let channels = output_shape.and_then(|shape| {
    let dims = match shape {
      [1, d1, d2] | [d1, d2] => (*d1, *d2),
      _ => return None,
    };
    let channels = match config.output_layout {
      OutputLayout::Nc => dims.1,
      OutputLayout::Cn => dims.0,
    };
    usize::try_from(channels).ok()
  });
  let header = if config.has_objectness { 5 } else { 4 };

  match channels {
    Some(c) if c >= header + COCO_NUM_CLASSES => LabelTable::coco(),
    _ => LabelTable::from_slice(&["cat", "dog"]),
  }
}

/// 单个检测框及其品种
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
  pub detection: Detection,
  pub breed_index: usize,
  pub breed_label: String,
  pub breed_probability: f32,
}

/// 先检测、再对每个宠物框做品种分类
///
/// 会话只读共享；同一个流水线可以被多个线程同时调用。
pub struct PetPipeline<D, C> {
  detector: D,
  classifier: BreedClassifier<C>,
  detection_labels: LabelTable,
  config: PipelineConfig,
}

impl<D: InferenceSession, C: InferenceSession> PetPipeline<D, C> {
  pub fn new(detector: D, classifier: C, breed_labels: LabelTable, config: PipelineConfig) -> Self {
    let detection_labels = default_detection_labels(detector.output_shape(), &config);
    Self {
      detector,
      classifier: BreedClassifier::new(classifier, breed_labels),
      detection_labels,
      config,
    }
  }

  pub fn with_detection_labels(mut self, labels: LabelTable) -> Self {
    self.detection_labels = labels;
    self
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn detection_labels(&self) -> &LabelTable {
    &self.detection_labels
  }

  pub fn breed_labels(&self) -> &LabelTable {
    self.classifier.labels()
  }

  /// 检查配置以及模型声明的形状是否与配置一致
  ///
  /// 只在加载时做一次，推理时不再检查。模型未声明形状或含动态维度时跳过对应检查。
  pub fn validate(&self) -> Result<(), PipelineError> {
    let config = &self.config;
    config.validate()?;

    let checks = [
      (
        "检测",
        self.detector.input_shape(),
        config.detection_layout,
        config.detection_input_size,
      ),
      (
        "分类",
        self.classifier.session().input_shape(),
        config.classification_layout,
        config.classification_input_size,
      ),
    ];
    for (name, shape, layout, size) in checks {
      let Some(shape) = shape else {
        continue;
      };
      match TensorLayout::from_input_shape(shape) {
        Some(declared) if declared != (layout, size) => {
          return Err(PipelineError::invalid(format!(
            "{}模型输入形状 {:?} 与配置 {:?} {} 不符",
            name, shape, layout, size
          )));
        }
        Some(_) => {}
        None => debug!("{}模型输入形状 {:?} 无法确定，跳过检查", name, shape),
      }
    }

    if let Some(shape) = self.detector.output_shape()
      && let Some(layout) = OutputLayout::infer(shape)
      && layout != config.output_layout
    {
      return Err(PipelineError::invalid(format!(
        "检测模型输出形状 {:?} 应按 {:?} 解码, 配置为 {:?}",
        shape, layout, config.output_layout
      )));
    }

    for label in &config.target_labels {
      if self.detection_labels.position(label).is_none() {
        warn!("目标类别 {} 不在检测标签中", label);
      }
    }

    info!(
      "流水线就绪: 检测 {} 类, 品种 {} 类",
      self.detection_labels.len(),
      self.breed_labels().len()
    );
    Ok(())
  }

  /// 只做检测，返回原图坐标下的宠物框
  ///
  /// `config` 在每次调用时检查取值范围。检测标签在构造时确定，不随 `config` 变化。
  pub fn detect(&self, image: &PixelBuffer, config: &PipelineConfig) -> Result<Vec<Detection>, PipelineError> {
    config.validate()?;

    debug!("[{}] 输入 {}x{}", Stage::LetterboxAndEncode, image.width(), image.height());
    let boxed = letterbox(image, config.detection_input_size)?;
    let input = config.detection_encoder().encode(&boxed.image)?;

    debug!("[{}] 输入张量 {:?}", Stage::Detect, input.shape());
    let output = self
      .detector
      .run(&input)
      .map_err(|e| PipelineError::inference(Stage::Detect, e))?;

    // 过小或无效的框在抑制之前丢弃，不参与 NMS
    let candidates = config
      .decoder()
      .decode(&output)?
      .into_iter()
      .enumerate()
      .filter_map(|(index, raw)| {
        let label = self.detection_labels.label_or_unknown(raw.class_id);
        if !config.is_target(label) {
          return None;
        }
        let bbox = boxed.back_project(&raw.bbox);
        if !bbox.is_valid() || bbox.width() < config.min_box_side || bbox.height() < config.min_box_side {
          debug!(
            "[{}] 候选 #{} 框过小 {:.1}x{:.1}，丢弃",
            Stage::BackProject,
            index,
            bbox.width(),
            bbox.height()
          );
          return None;
        }
        Some(Detection {
          label: label.to_string(),
          class_id: raw.class_id,
          confidence: raw.confidence,
          bbox,
        })
      })
      .collect::<Vec<_>>();

    let mut detections = non_max_suppression(candidates, config.nms_iou_threshold);
    debug!("[{}] 抑制后剩余 {} 个框", Stage::DecodeAndSuppress, detections.len());
    if detections.len() > config.max_detections {
      debug!("[{}] 达到最大检测数 {}", Stage::DecodeAndSuppress, config.max_detections);
      detections.truncate(config.max_detections);
    }

    info!("检测到 {} 个目标", detections.len());
    Ok(detections)
  }

  /// 检测后对每个需要分类的框做品种分类
  ///
  /// 检测失败时整个调用失败；单个框的裁剪或分类失败只丢弃该框并记录日志。
  pub fn detect_and_classify(
    &self,
    image: &PixelBuffer,
    config: &PipelineConfig,
  ) -> Result<Vec<ClassificationResult>, PipelineError> {
    let detections = self.detect(image, config)?;
    let candidates = detections
      .into_iter()
      .enumerate()
      .filter(|(_, det)| config.should_classify(&det.label))
      .collect::<Vec<_>>();
    if candidates.is_empty() {
      debug!("[{}] 没有需要分类的目标", Stage::Done);
      return Ok(Vec::new());
    }

    let encoder = config.classification_encoder();
    let workers = config.classify_workers.max(1).min(candidates.len());
    let results = if workers == 1 {
      candidates
        .into_iter()
        .filter_map(|(index, det)| self.classify_one(index, det, image, &encoder, config))
        .collect::<Vec<_>>()
    } else {
      self.classify_parallel(candidates, workers, image, &encoder, config)
    };

    info!("[{}] 分类完成 {} 个目标", Stage::Done, results.len());
    Ok(results)
  }

  fn classify_parallel(
    &self,
    candidates: Vec<(usize, Detection)>,
    workers: usize,
    image: &PixelBuffer,
    encoder: &TensorEncoder,
    config: &PipelineConfig,
  ) -> Vec<ClassificationResult> {
    let classify = |candidates: Vec<(usize, Detection)>| {
      candidates
        .into_par_iter()
        .filter_map(|(index, det)| self.classify_one(index, det, image, encoder, config))
        .collect::<Vec<_>>()
    };

    match ThreadPoolBuilder::new().num_threads(workers).build() {
      Ok(pool) => {
        debug!("[{}] {} 个线程并行分类", Stage::Classify, workers);
        pool.install(|| classify(candidates))
      }
      Err(e) => {
        warn!("[{}] 无法创建分类线程池，使用全局线程池: {}", Stage::Classify, e);
        classify(candidates)
      }
    }
  }

  fn classify_one(
    &self,
    index: usize,
    detection: Detection,
    image: &PixelBuffer,
    encoder: &TensorEncoder,
    config: &PipelineConfig,
  ) -> Option<ClassificationResult> {
    let crop = match crop_with_margin(image, &detection.bbox, config.crop_margin_ratio) {
      Ok(crop) => crop,
      Err(e) => {
        warn!("[{}] 检测 #{} 裁剪失败: {}", Stage::Crop, index, e);
        return None;
      }
    };

    let prediction = match self.classifier.classify(&crop, encoder) {
      Ok(prediction) => prediction,
      Err(e) => {
        let stage = match &e {
          PipelineError::ModelInference { stage, .. } => *stage,
          _ => Stage::Encode,
        };
        warn!("[{}] 检测 #{} 分类失败，跳过: {}", stage, index, e);
        return None;
      }
    };

    if prediction.probability < config.min_breed_probability {
      debug!(
        "[{}] 检测 #{} 品种 {} 概率 {:.3} 低于阈值",
        Stage::Classify,
        index,
        prediction.label,
        prediction.probability
      );
      return None;
    }

    Some(ClassificationResult {
      detection,
      breed_index: prediction.index,
      breed_label: prediction.label,
      breed_probability: prediction.probability,
    })
  }
}

impl<D: InferenceSession, C: InferenceSession> Model for PetPipeline<D, C> {
  type Input = PixelBuffer;
  type Output = Vec<ClassificationResult>;
  type Error = PipelineError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.detect_and_classify(input, &self.config)
  }
}
