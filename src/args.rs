// 该文件是 PetLens （宠物之眼） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use petlens::{
  PipelineConfig,
  postprocess::{BoxEncoding, OutputLayout},
  preprocess::Normalization,
};
use url::Url;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskKind {
  /// 处理第一张图像
  Oneshot,
  /// 对第一张图像重复推理并统计耗时
  Repeat,
  /// 处理全部图像，直到输入耗尽或收到 Ctrl-C
  Continuous,
}

/// PetLens 宠物检测与品种识别
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测模型 (ONNX)
  #[arg(long, value_name = "FILE")]
  pub detector: PathBuf,

  /// 品种分类模型 (ONNX)
  #[arg(long, value_name = "FILE")]
  pub classifier: PathBuf,

  /// 品种标签文件，每行一个
  #[arg(long, value_name = "FILE")]
  pub labels: PathBuf,

  /// 检测类别标签文件，不指定时按模型输出形状选择
  #[arg(long, value_name = "FILE")]
  pub detection_labels: Option<PathBuf>,

  /// 输入来源，例如 image:///photos/dog.jpg 或 image:///photos/
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出，例如 stdout:// 或 folder:///records?always
  #[arg(long, value_name = "OUTPUT", default_value = "stdout://")]
  pub output: Url,

  #[arg(long, value_enum, default_value_t = TaskKind::Oneshot)]
  pub task: TaskKind,

  /// 重复任务的推理次数
  #[arg(long, default_value_t = 100)]
  pub repeat: usize,

  /// 连续任务最多处理的图像数
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,

  /// 检测置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = 0.55, value_name = "THRESHOLD")]
  pub score_threshold: f32,

  /// NMS IoU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = 0.5, value_name = "THRESHOLD")]
  pub nms_threshold: f32,

  /// 品种概率下限 (0.0 - 1.0)
  #[arg(long, default_value_t = 0.30, value_name = "PROBABILITY")]
  pub min_breed_probability: f32,

  /// 裁剪时每侧扩展的比例
  #[arg(long, default_value_t = 0.1)]
  pub crop_margin: f32,

  /// 检测框编码: xywh 或 xyxy
  #[arg(long, default_value = "xywh")]
  pub box_encoding: BoxEncoding,

  /// 检测输出布局 nc 或 cn，不指定时按模型输出形状推断
  #[arg(long)]
  pub output_layout: Option<OutputLayout>,

  /// 检测输出没有 objectness 列 (YOLOv8/11)
  #[arg(long)]
  pub no_objectness: bool,

  /// 分类输入使用 ImageNet 均值/方差归一化
  #[arg(long)]
  pub imagenet_norm: bool,

  /// 保留的检测类别，逗号分隔
  #[arg(long, value_delimiter = ',', default_value = "cat,dog")]
  pub target_labels: Vec<String>,

  /// 需要做品种分类的检测类别，逗号分隔
  #[arg(long, value_delimiter = ',', default_value = "dog")]
  pub classify_labels: Vec<String>,

  /// 并行分类的线程数
  #[arg(long, default_value_t = 1)]
  pub workers: usize,

  /// ONNX Runtime 算子内线程数
  #[arg(long, default_value_t = 4)]
  pub intra_threads: usize,
}

impl Args {
  /// 命令行参数对应的流水线配置（模型形状相关的字段稍后按模型调整）
  pub fn pipeline_config(&self) -> PipelineConfig {
    let mut config = PipelineConfig::default()
      .with_score_threshold(self.score_threshold)
      .with_nms_iou_threshold(self.nms_threshold)
      .with_min_breed_probability(self.min_breed_probability)
      .with_crop_margin_ratio(self.crop_margin)
      .with_box_encoding(self.box_encoding)
      .with_objectness(!self.no_objectness)
      .with_target_labels(self.target_labels.iter().cloned())
      .with_classify_labels(self.classify_labels.iter().cloned())
      .with_classify_workers(self.workers);
    if self.imagenet_norm {
      config = config.with_classification_normalization(Some(Normalization::IMAGENET));
    }
    if let Some(layout) = self.output_layout {
      config = config.with_output_layout(layout);
    }
    config
  }
}
