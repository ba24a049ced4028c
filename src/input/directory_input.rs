// 该文件是 HealthGuard（健康卫士）项目的一部分。
// src/input/directory_input.rs - 目录批量输入
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 HealthGuard 开发组

use std::{collections::VecDeque, path::PathBuf};

use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::ImageBytes, url_path};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum DirectoryInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("{path}: {source}")]
  IoError {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// `folder:///path/to/dir`：按文件名顺序产出目录下的 jpg/jpeg/png 文件，不递归。
pub struct DirectoryInput {
  directory: PathBuf,
  files: VecDeque<PathBuf>,
}

impl DirectoryInput {
  pub fn directory(&self) -> &PathBuf {
    &self.directory
  }

  pub fn remaining(&self) -> usize {
    self.files.len()
  }
}

fn is_image_file(path: &std::path::Path) -> bool {
  path.is_file()
    && path
      .extension()
      .and_then(|e| e.to_str())
      .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

impl FromUrlWithScheme for DirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryInput {
  type Error = DirectoryInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(DirectoryInputError::SchemeMismatch);
    }

    let directory = url_path(url);
    let io_error = |source| DirectoryInputError::IoError {
      path: directory.clone(),
      source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(&directory).map_err(io_error)? {
      let path = entry.map_err(io_error)?.path();
      if is_image_file(&path) {
        files.push(path);
      }
    }
    files.sort();

    info!("目录 {} 中找到 {} 个图像文件", directory.display(), files.len());
    Ok(DirectoryInput {
      directory,
      files: files.into(),
    })
  }
}

impl Iterator for DirectoryInput {
  type Item = Result<ImageBytes, DirectoryInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.files.pop_front()?;
    let name = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| path.display().to_string());

    Some(
      std::fs::read(&path)
        .map(|data| ImageBytes::new(name, data))
        .map_err(|source| DirectoryInputError::IoError { path, source }),
    )
  }
}
