// 该文件是 PetLens （宠物之眼） 项目的一部分。
// src/model/cache.rs - 模型与标签的惰性加载
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
  path::{Path, PathBuf},
  sync::OnceLock,
};

use tracing::{debug, error, info};

use crate::{
  error::PipelineError,
  model::{LabelTable, ModelLoader},
  pipeline::{PetPipeline, PipelineConfig},
};

/// 只初始化一次的只读资源
///
/// 初始化结果（包括失败）会被缓存：加载失败的资源之后每次访问都返回同一个错误，
/// 不会重试。初始化之后的访问不加锁。
pub struct LazyAsset<T> {
  name: String,
  cell: OnceLock<Result<T, PipelineError>>,
}

impl<T> LazyAsset<T> {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      cell: OnceLock::new(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn is_initialized(&self) -> bool {
    self.cell.get().is_some()
  }

  pub fn get_or_init<F>(&self, init: F) -> Result<&T, PipelineError>
  where
    F: FnOnce() -> Result<T, PipelineError>,
  {
    self
      .cell
      .get_or_init(|| {
        info!("初始化资源: {}", self.name);
        let result = init();
        if let Err(e) = &result {
          error!("资源 {} 初始化失败: {}", self.name, e);
        }
        result
      })
      .as_ref()
      .map_err(Clone::clone)
  }
}

/// 读取模型文件
pub fn load_model_file(path: &Path) -> Result<Vec<u8>, PipelineError> {
  info!("加载模型文件: {}", path.display());
  let data = std::fs::read(path).map_err(|e| PipelineError::asset(path.display().to_string(), e))?;
  debug!(
    "模型文件大小: {:.2} MB",
    data.len() as f64 / (1024.0 * 1024.0)
  );
  Ok(data)
}

/// 检测模型、分类模型与标签表的进程级缓存
///
/// 每个资源在第一次被用到时加载；之后构造的流水线共享同一组会话。
pub struct ModelRegistry<L: ModelLoader> {
  loader: L,
  detector_path: PathBuf,
  classifier_path: PathBuf,
  breed_labels_path: PathBuf,
  detection_labels_path: Option<PathBuf>,
  detector: LazyAsset<L::Session>,
  classifier: LazyAsset<L::Session>,
  breed_labels: LazyAsset<LabelTable>,
  detection_labels: LazyAsset<Option<LabelTable>>,
}

impl<L: ModelLoader> ModelRegistry<L> {
  pub fn new(
    loader: L,
    detector_path: impl Into<PathBuf>,
    classifier_path: impl Into<PathBuf>,
    breed_labels_path: impl Into<PathBuf>,
  ) -> Self {
    Self {
      loader,
      detector_path: detector_path.into(),
      classifier_path: classifier_path.into(),
      breed_labels_path: breed_labels_path.into(),
      detection_labels_path: None,
      detector: LazyAsset::new("detector"),
      classifier: LazyAsset::new("classifier"),
      breed_labels: LazyAsset::new("breed_labels"),
      detection_labels: LazyAsset::new("detection_labels"),
    }
  }

  /// 检测模型的类别标签文件，不设置时按输出形状选择默认标签
  pub fn with_detection_labels(mut self, path: impl Into<PathBuf>) -> Self {
    self.detection_labels_path = Some(path.into());
    self
  }

  fn load_session(&self, path: &Path) -> Result<L::Session, PipelineError> {
    let data = load_model_file(path)?;
    info!("创建推理会话: {}", path.display());
    let session = self
      .loader
      .load(&data)
      .map_err(|e| PipelineError::asset(path.display().to_string(), e))?;
    info!("模型加载完成");
    Ok(session)
  }

  fn load_labels(path: &Path) -> Result<LabelTable, PipelineError> {
    LabelTable::from_file(path).map_err(|e| PipelineError::asset(path.display().to_string(), e))
  }

  pub fn detector(&self) -> Result<&L::Session, PipelineError> {
    self
      .detector
      .get_or_init(|| self.load_session(&self.detector_path))
  }

  pub fn classifier(&self) -> Result<&L::Session, PipelineError> {
    self
      .classifier
      .get_or_init(|| self.load_session(&self.classifier_path))
  }

  pub fn breed_labels(&self) -> Result<&LabelTable, PipelineError> {
    self
      .breed_labels
      .get_or_init(|| Self::load_labels(&self.breed_labels_path))
  }

  pub fn detection_labels(&self) -> Result<Option<&LabelTable>, PipelineError> {
    self
      .detection_labels
      .get_or_init(|| {
        self
          .detection_labels_path
          .as_deref()
          .map(Self::load_labels)
          .transpose()
      })
      .map(Option::as_ref)
  }

  /// 用缓存的会话构造流水线，并检查模型形状与配置是否匹配
  pub fn pipeline(
    &self,
    config: PipelineConfig,
  ) -> Result<PetPipeline<&L::Session, &L::Session>, PipelineError> {
    let detector = self.detector()?;
    let classifier = self.classifier()?;
    let breed_labels = self.breed_labels()?.clone();

    let mut pipeline = PetPipeline::new(detector, classifier, breed_labels, config);
    if let Some(labels) = self.detection_labels()? {
      pipeline = pipeline.with_detection_labels(labels.clone());
    }
    pipeline.validate()?;
    Ok(pipeline)
  }
}
