//! Document permission policy.
//!
//! The policy is fixed for the product, not configurable per tenant: editing
//! follows the format, everything else is constant.

use serde::{Deserialize, Serialize};

use crate::formats::table::FormatCapability;

/// Permissions block of the editor's document descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    pub comment: bool,
    pub copy: bool,
    pub delete_comment_author_only: bool,
    pub download: bool,
    pub edit: bool,
    pub edit_comment_author_only: bool,
    pub fill_forms: bool,
    pub modify_content_control: bool,
    pub modify_filter: bool,
    pub print: bool,
    pub review: bool,
}

impl Permissions {
    pub fn for_format(format: &FormatCapability) -> Self {
        Self {
            comment: true,
            copy: true,
            delete_comment_author_only: false,
            download: true,
            edit: format.can_edit,
            edit_comment_author_only: false,
            fill_forms: format.can_fill,
            modify_content_control: true,
            modify_filter: true,
            print: false,
            review: false,
        }
    }
}
