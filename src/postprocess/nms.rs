// 该文件是 PetLens （宠物之眼） 项目的一部分。
// src/postprocess/nms.rs - 非极大值抑制
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

use crate::postprocess::Scored;

/// 贪心非极大值抑制（不区分类别）
///
/// 按置信度降序稳定排序，分数相同的保持原始顺序；依次保留未被抑制的框，
/// 并抑制其后与之 IoU 严格大于 `iou_threshold` 的框。
pub fn non_max_suppression<T: Scored>(mut detections: Vec<T>, iou_threshold: f32) -> Vec<T> {
  if detections.len() < 2 {
    return detections;
  }

  // 按置信度降序排序
  detections.sort_by(|a, b| b.score().total_cmp(&a.score()));

  let mut suppressed = vec![false; detections.len()];
  for i in 0..detections.len() {
    if suppressed[i] {
      continue;
    }
    for j in (i + 1)..detections.len() {
      if !suppressed[j] && detections[i].bbox().iou(detections[j].bbox()) > iou_threshold {
        suppressed[j] = true;
      }
    }
  }

  detections
    .into_iter()
    .zip(suppressed)
    .filter_map(|(det, suppressed)| (!suppressed).then_some(det))
    .collect()
}
