use serde::Deserialize;
use serde::de::DeserializeOwned;

pub(crate) fn parse_args<T: DeserializeOwned>(args: serde_json::Value) -> Result<T, String> {
    serde_json::from_value(args).map_err(|e| format!("args: {e}"))
}

// ── File tools ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct CreateFileArgs {
    #[serde(default)]
    pub(crate) filename: Option<String>,
    #[serde(default)]
    pub(crate) path: Option<String>,
    #[serde(default)]
    pub(crate) content: Option<String>,
}

/// Shared by read, delete, info and size lookups.
#[derive(Debug, Deserialize)]
pub(crate) struct FilePathArgs {
    pub(crate) file_path: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WriteFileArgs {
    pub(crate) file_path: String,
    pub(crate) content: String,
    #[serde(default)]
    pub(crate) overwrite: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AppendFileArgs {
    pub(crate) file_path: String,
    pub(crate) content: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateFolderArgs {
    pub(crate) folder_name: String,
    #[serde(default)]
    pub(crate) path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeleteFolderArgs {
    pub(crate) folder_path: String,
    #[serde(default)]
    pub(crate) recursive: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FolderPathArgs {
    pub(crate) folder_path: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListDirectoryArgs {
    #[serde(default)]
    pub(crate) path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MoveArgs {
    pub(crate) source_path: String,
    pub(crate) destination_path: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchFilesArgs {
    #[serde(default)]
    pub(crate) directory: Option<String>,
    #[serde(default)]
    pub(crate) pattern: Option<String>,
    #[serde(default)]
    pub(crate) recursive: Option<bool>,
}

// ── Email tools ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct SendEmailArgs {
    pub(crate) to: String,
    pub(crate) subject: String,
    pub(crate) body: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecentEmailsArgs {
    #[serde(default)]
    pub(crate) max_results: Option<i64>,
    #[serde(default)]
    pub(crate) include_spam_trash: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchEmailsArgs {
    pub(crate) query: String,
    #[serde(default)]
    pub(crate) max_results: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CountEmailsArgs {
    #[serde(default)]
    pub(crate) query: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MaxResultsArgs {
    #[serde(default)]
    pub(crate) max_results: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SenderArgs {
    pub(crate) sender_email: String,
    #[serde(default)]
    pub(crate) max_results: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DateRangeArgs {
    pub(crate) start_date: String,
    pub(crate) end_date: String,
    #[serde(default)]
    pub(crate) max_results: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageIdArgs {
    pub(crate) message_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReplyEmailArgs {
    pub(crate) message_id: String,
    pub(crate) reply_body: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddLabelArgs {
    pub(crate) message_id: String,
    pub(crate) label_id: String,
}
