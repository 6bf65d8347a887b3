// 该文件是 PetLens （宠物之眼） 项目的一部分。
// src/main.rs - 命令行主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use petlens::{
  FromUrl,
  input::InputWrapper,
  model::{InferenceSession, ModelRegistry, onnx::OnnxLoader},
  output::OutputWrapper,
  task::{ContinuousTask, OneShotTask, RepeatShotTask, Task},
};

use crate::args::{Args, TaskKind};

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  info!("检测模型: {}", args.detector.display());
  info!("分类模型: {}", args.classifier.display());
  info!("品种标签: {}", args.labels.display());
  info!("输入来源: {}", args.input);
  info!("输出: {}", args.output);

  let loader = OnnxLoader::default().with_intra_threads(args.intra_threads);
  let mut registry = ModelRegistry::new(loader, &args.detector, &args.classifier, &args.labels);
  if let Some(path) = &args.detection_labels {
    registry = registry.with_detection_labels(path);
  }

  // 模型声明的形状决定输入布局与尺寸；命令行显式给出的输出布局优先
  let detector = registry.detector()?;
  let classifier = registry.classifier()?;
  let mut config = args
    .pipeline_config()
    .adapt_to_detector(detector.input_shape(), detector.output_shape())
    .adapt_to_classifier(classifier.input_shape());
  if let Some(layout) = args.output_layout {
    config = config.with_output_layout(layout);
  }
  info!("流水线配置: {:?}", config);

  let pipeline = registry.pipeline(config)?;
  let input = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  match args.task {
    TaskKind::Oneshot => OneShotTask.run_task(input, pipeline, output)?,
    TaskKind::Repeat => RepeatShotTask::default()
      .with_times(args.repeat)
      .run_task(input, pipeline, output)?,
    TaskKind::Continuous => ContinuousTask::default()
      .with_frame_number(args.frame_number)
      .run_task(input, pipeline, output)?,
  }

  Ok(())
}
