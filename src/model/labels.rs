// 该文件是 PetLens （宠物之眼） 项目的一部分。
// src/model/labels.rs - 标签表
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

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

/// 类别索引越界时使用的标签
pub const UNKNOWN_LABEL: &str = "UNKNOWN";

const COCO_LABELS: &str = include_str!("../../labels/coco.txt");

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("标签文件读取失败 {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("标签文件为空: {0}")]
  Empty(String),
}

/// 有序标签表，第 i 行对应类别索引 i
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelTable {
  labels: Vec<String>,
}

impl LabelTable {
  /// 每行一个标签，去掉首尾空白
  ///
  /// 中间的空行保留为空标签，保持第 i 行对应类别 i；只去掉文件末尾的空行。
  pub fn parse(text: &str) -> Self {
    let mut labels = text
      .lines()
      .map(|line| line.trim().to_string())
      .collect::<Vec<_>>();
    while labels.last().is_some_and(String::is_empty) {
      labels.pop();
    }
    Self { labels }
  }

  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LabelError> {
    let path = path.as_ref();
    info!("加载标签文件: {}", path.display());
    let text = std::fs::read_to_string(path).map_err(|source| LabelError::Io {
      path: path.display().to_string(),
      source,
    })?;

    let table = Self::parse(&text);
    if table.is_empty() {
      return Err(LabelError::Empty(path.display().to_string()));
    }
    debug!("共 {} 个标签", table.len());
    Ok(table)
  }

  pub fn from_slice<S: AsRef<str>>(labels: &[S]) -> Self {
    Self {
      labels: labels.iter().map(|s| s.as_ref().to_string()).collect(),
    }
  }

  /// COCO 数据集的 80 个类别
  pub fn coco() -> Self {
    Self::parse(COCO_LABELS)
  }

  pub fn get(&self, index: usize) -> Option<&str> {
    self.labels.get(index).map(String::as_str)
  }

  pub fn label_or_unknown(&self, index: usize) -> &str {
    self.get(index).unwrap_or(UNKNOWN_LABEL)
  }

  pub fn position(&self, label: &str) -> Option<usize> {
    self.labels.iter().position(|l| l == label)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.labels.iter().map(String::as_str)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_trims_lines() {
    let table = LabelTable::parse("beagle\r\n  poodle \nshiba\n\n\n");
    assert_eq!(table.len(), 3);
    assert_eq!(table.get(1), Some("poodle"));
    assert_eq!(table.get(2), Some("shiba"));
  }

  #[test]
  fn test_interior_blank_line_keeps_indices() {
    let table = LabelTable::parse("beagle\n\nshiba\n");
    assert_eq!(table.len(), 3);
    assert_eq!(table.get(1), Some(""));
    assert_eq!(table.get(2), Some("shiba"));
    assert_eq!(table.position("shiba"), Some(2));
  }

  #[test]
  fn test_blank_file_is_empty() {
    assert!(LabelTable::parse("\n  \n\n").is_empty());
  }

  #[test]
  fn test_out_of_range_is_unknown() {
    let table = LabelTable::from_slice(&["cat", "dog"]);
    assert_eq!(table.label_or_unknown(1), "dog");
    assert_eq!(table.label_or_unknown(2), UNKNOWN_LABEL);
  }

  #[test]
  fn test_coco_contains_pets() {
    let table = LabelTable::coco();
    assert_eq!(table.len(), 80);
    assert_eq!(table.position("cat"), Some(15));
    assert_eq!(table.position("dog"), Some(16));
  }

  #[test]
  fn test_missing_file() {
    let result = LabelTable::from_file("/nonexistent/petlens/labels.txt");
    assert!(matches!(result, Err(LabelError::Io { .. })));
  }
}
