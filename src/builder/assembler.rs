//! Editor config assembly and signing.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::builder::fanout::Resolved;
use crate::builder::BuildRequest;
use crate::config::EditorConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::formats::{DocumentType, FormatTable, Permissions};
use crate::signing::TokenSigner;

/// Claims of the short-lived download/callback token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadClaims {
    pub uid: u64,
    pub cid: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
}

impl DeviceType {
    const MOBILE_MARKERS: &'static [&'static str] = &[
        "mobi", "android", "iphone", "ipad", "ipod", "tablet", "opera mini", "iemobile", "silk",
    ];

    /// Mobile and tablet user agents get the mobile editor.
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        if Self::MOBILE_MARKERS.iter().any(|marker| ua.contains(marker)) {
            DeviceType::Mobile
        } else {
            DeviceType::Desktop
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDescriptor {
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub file_type: String,
    pub key: String,
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub permissions: Option<Permissions>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorUser {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goback {
    pub request_close: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customization {
    pub goback: Goback,
    pub plugins: bool,
    pub hide_right_menu: bool,
    pub ui_theme: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorDescriptor {
    pub user: EditorUser,
    pub callback_url: String,
    pub customization: Customization,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub lang: String,
}

/// Signed editor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResult {
    pub document: DocumentDescriptor,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub document_type: Option<DocumentType>,
    pub editor_config: EditorDescriptor,
    #[serde(rename = "type")]
    pub device: DeviceType,
    #[serde(rename = "serverUrl")]
    pub server_url: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub access_code: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub token: String,
}

/// Builds and signs [`ConfigResult`]s.
#[derive(Debug, Clone)]
pub struct ConfigAssembler {
    editor: EditorConfig,
    formats: &'static FormatTable,
    signer: TokenSigner,
}

impl ConfigAssembler {
    pub fn new(editor: EditorConfig) -> Self {
        Self {
            editor,
            formats: FormatTable::builtin(),
            signer: TokenSigner::new(),
        }
    }

    pub fn formats(&self) -> &'static FormatTable {
        self.formats
    }

    /// Assemble the config for `request` and sign it with the tenant's
    /// document server secret. Nothing unsigned ever leaves this function.
    pub fn assemble(
        &self,
        request: &BuildRequest,
        resolved: &Resolved,
        access_code: Option<String>,
    ) -> GatewayResult<ConfigResult> {
        let secret = resolved.server.secret.as_str();
        let identity = &resolved.identity;

        let short_token = self.signer.sign(
            secret,
            &DownloadClaims {
                uid: identity.external_user_id,
                cid: identity.tenant_id,
            },
            Duration::from_secs(self.editor.download_token_ttl_secs),
        )?;

        let tenant = identity.tenant_id.to_string();
        let download_url = endpoint_url(
            &self.editor.gateway_url,
            "download",
            &[
                ("cid", tenant.as_str()),
                ("fid", request.file_id.as_str()),
                ("token", short_token.as_str()),
            ],
        )?;
        let callback_url = endpoint_url(
            &self.editor.callback_url,
            "callback",
            &[
                ("cid", tenant.as_str()),
                ("did", request.deal_id.as_str()),
                ("fid", request.file_id.as_str()),
                ("filename", request.file_name.as_str()),
                ("token", short_token.as_str()),
            ],
        )?;

        let format = self.formats.resolve_file(&request.file_name);

        let mut config = ConfigResult {
            document: DocumentDescriptor {
                file_type: format.map(|f| f.extension.to_string()).unwrap_or_default(),
                key: request.doc_key.clone(),
                title: request.file_name.clone(),
                url: download_url,
                permissions: format.map(Permissions::for_format),
            },
            document_type: format.map(|f| f.document_type),
            editor_config: EditorDescriptor {
                user: EditorUser {
                    id: identity.composite_id(),
                    name: identity.display_name.clone(),
                },
                callback_url,
                customization: Customization {
                    goback: Goback { request_close: true },
                    plugins: false,
                    hide_right_menu: true,
                    ui_theme: ui_theme(request.dark_mode).to_string(),
                },
                lang: identity.locale.clone(),
            },
            device: DeviceType::from_user_agent(&request.user_agent),
            server_url: resolved.server.address.clone(),
            access_code,
            token: String::new(),
        };

        config.token = self.signer.sign(
            secret,
            &config,
            Duration::from_secs(self.editor.config_token_ttl_secs),
        )?;

        Ok(config)
    }
}

fn ui_theme(dark_mode: bool) -> &'static str {
    if dark_mode {
        "default-dark"
    } else {
        "default-light"
    }
}

fn endpoint_url(base: &str, path: &str, query: &[(&str, &str)]) -> GatewayResult<String> {
    let raw = format!("{}/{}", base.trim_end_matches('/'), path);
    let mut url = Url::parse(&raw)
        .map_err(|e| GatewayError::Internal(format!("invalid {} base URL: {}", path, e)))?;
    url.query_pairs_mut().extend_pairs(query.iter().copied());
    Ok(url.into())
}
