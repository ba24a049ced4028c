// 该文件是 HealthGuard（健康卫士）项目的一部分。
// src/input.rs - 图像输入
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

use thiserror::Error;

use crate::{FromUrl, FromUrlWithScheme};

mod directory_input;
mod read_image_file;

pub use self::directory_input::{DirectoryInput, DirectoryInputError};
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

/// 未解码的图像文件内容。解码在分析器内完成，坏文件会得到 `InvalidImage`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBytes {
  pub name: String,
  pub data: Vec<u8>,
}

impl ImageBytes {
  pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
    Self {
      name: name.into(),
      data,
    }
  }
}

impl AsRef<[u8]> for ImageBytes {
  fn as_ref(&self) -> &[u8] {
    &self.data
  }
}

#[derive(Error, Debug)]
pub enum InputError {
  #[error("图像文件输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[error("目录输入错误: {0}")]
  DirectoryInputError(#[from] DirectoryInputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum InputWrapper {
  ImageFile(ImageFileInput),
  Directory(DirectoryInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ImageFileInput::SCHEME => Ok(InputWrapper::ImageFile(ImageFileInput::from_url(url)?)),
      DirectoryInput::SCHEME => Ok(InputWrapper::Directory(DirectoryInput::from_url(url)?)),
      other => Err(InputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = Result<ImageBytes, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::ImageFile(input) => input.next().map(|r| r.map_err(InputError::from)),
      InputWrapper::Directory(input) => input.next().map(|r| r.map_err(InputError::from)),
    }
  }
}
