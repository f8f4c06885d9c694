pub(crate) fn file_tool_definitions() -> Vec<serde_json::Value> {
    vec![
        serde_json::json!({
            "name": "create_file_tool",
            "description": "Create a new file with optional content. Fails if the file already exists. Defaults: filename=\"new_file.txt\", path=\".\" (use \"desktop\" for the Desktop), content=\"\".",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "filename": { "type": "string", "description": "Name of the file to create" },
                    "path": { "type": "string", "description": "Directory to create the file in" },
                    "content": { "type": "string", "description": "Initial file content" }
                },
                "required": []
            }
        }),
        serde_json::json!({
            "name": "read_file_tool",
            "description": "Read the text content of a file.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "file_path": { "type": "string" }
                },
                "required": ["file_path"]
            }
        }),
        serde_json::json!({
            "name": "write_file_tool",
            "description": "Write content to a file. Refuses to replace an existing file unless overwrite=true.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "file_path": { "type": "string" },
                    "content": { "type": "string" },
                    "overwrite": { "type": "boolean", "description": "Replace an existing file (default false)" }
                },
                "required": ["file_path", "content"]
            }
        }),
        serde_json::json!({
            "name": "append_to_file_tool",
            "description": "Append content to the end of an existing file.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "file_path": { "type": "string" },
                    "content": { "type": "string" }
                },
                "required": ["file_path", "content"]
            }
        }),
        serde_json::json!({
            "name": "delete_file_tool",
            "description": "Delete a file.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "file_path": { "type": "string" }
                },
                "required": ["file_path"]
            }
        }),
        serde_json::json!({
            "name": "create_folder_tool",
            "description": "Create a new folder (parents included). Default path=\".\".",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "folder_name": { "type": "string" },
                    "path": { "type": "string", "description": "Parent directory" }
                },
                "required": ["folder_name"]
            }
        }),
        serde_json::json!({
            "name": "delete_folder_tool",
            "description": "Delete a folder. Non-empty folders need recursive=true.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "folder_path": { "type": "string" },
                    "recursive": { "type": "boolean", "description": "Delete contents too (default false)" }
                },
                "required": ["folder_path"]
            }
        }),
        serde_json::json!({
            "name": "list_directory_tool",
            "description": "List the files and folders in a directory. Default path=\".\".",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string" }
                },
                "required": []
            }
        }),
        serde_json::json!({
            "name": "move_file_tool",
            "description": "Move or rename a file.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "source_path": { "type": "string" },
                    "destination_path": { "type": "string" }
                },
                "required": ["source_path", "destination_path"]
            }
        }),
        serde_json::json!({
            "name": "move_folder_tool",
            "description": "Move or rename a folder. The destination must not exist.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "source_path": { "type": "string" },
                    "destination_path": { "type": "string" }
                },
                "required": ["source_path", "destination_path"]
            }
        }),
        serde_json::json!({
            "name": "search_files_tool",
            "description": "Find files whose name matches a glob pattern such as \"*.pdf\". Defaults: directory=\".\", pattern=\"*\", recursive=false.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "directory": { "type": "string" },
                    "pattern": { "type": "string" },
                    "recursive": { "type": "boolean" }
                },
                "required": []
            }
        }),
        serde_json::json!({
            "name": "copy_file_tool",
            "description": "Copy a file to a new location.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "source_path": { "type": "string" },
                    "destination_path": { "type": "string" }
                },
                "required": ["source_path", "destination_path"]
            }
        }),
        serde_json::json!({
            "name": "get_file_info_tool",
            "description": "Get type, size, timestamps and extension of a file or folder.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "file_path": { "type": "string" }
                },
                "required": ["file_path"]
            }
        }),
        serde_json::json!({
            "name": "get_file_size_tool",
            "description": "Get the size of a file in bytes, KB and MB.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "file_path": { "type": "string" }
                },
                "required": ["file_path"]
            }
        }),
        serde_json::json!({
            "name": "get_folder_size_tool",
            "description": "Calculate the total size of a folder and count its files and subfolders.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "folder_path": { "type": "string" }
                },
                "required": ["folder_path"]
            }
        }),
    ]
}

pub(crate) fn email_tool_definitions() -> Vec<serde_json::Value> {
    vec![
        serde_json::json!({
            "name": "send_email_tool",
            "description": "Send a plain-text email.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "to": { "type": "string", "description": "Recipient address" },
                    "subject": { "type": "string" },
                    "body": { "type": "string" }
                },
                "required": ["to", "subject", "body"]
            }
        }),
        serde_json::json!({
            "name": "get_recent_emails_tool",
            "description": "Get the most recent emails. Defaults: max_results=10, include_spam_trash=false.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "max_results": { "type": "integer" },
                    "include_spam_trash": { "type": "boolean" }
                },
                "required": []
            }
        }),
        serde_json::json!({
            "name": "search_emails_tool",
            "description": "Search emails with Gmail query syntax (from:, subject:, after:, is:unread, has:attachment). Default max_results=50.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "max_results": { "type": "integer" }
                },
                "required": ["query"]
            }
        }),
        serde_json::json!({
            "name": "count_emails_tool",
            "description": "Count emails matching a Gmail query without fetching them. Empty query counts all emails.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": { "type": "string" }
                },
                "required": []
            }
        }),
        serde_json::json!({
            "name": "get_unread_emails_tool",
            "description": "Get unread emails. Default max_results=20.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "max_results": { "type": "integer" }
                },
                "required": []
            }
        }),
        serde_json::json!({
            "name": "get_emails_from_sender_tool",
            "description": "Get emails from a specific sender. Default max_results=50.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "sender_email": { "type": "string" },
                    "max_results": { "type": "integer" }
                },
                "required": ["sender_email"]
            }
        }),
        serde_json::json!({
            "name": "get_emails_by_date_range_tool",
            "description": "Get emails received between two dates (YYYY-MM-DD or YYYY/MM/DD). Default max_results=50.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "start_date": { "type": "string" },
                    "end_date": { "type": "string" },
                    "max_results": { "type": "integer" }
                },
                "required": ["start_date", "end_date"]
            }
        }),
        serde_json::json!({
            "name": "get_email_body_tool",
            "description": "Get the full plain-text body of an email.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "message_id": { "type": "string" }
                },
                "required": ["message_id"]
            }
        }),
        serde_json::json!({
            "name": "reply_to_email_tool",
            "description": "Reply to an email in the same thread.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "message_id": { "type": "string" },
                    "reply_body": { "type": "string" }
                },
                "required": ["message_id", "reply_body"]
            }
        }),
        serde_json::json!({
            "name": "mark_as_read_tool",
            "description": "Mark an email as read.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "message_id": { "type": "string" }
                },
                "required": ["message_id"]
            }
        }),
        serde_json::json!({
            "name": "mark_as_unread_tool",
            "description": "Mark an email as unread.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "message_id": { "type": "string" }
                },
                "required": ["message_id"]
            }
        }),
        serde_json::json!({
            "name": "delete_email_tool",
            "description": "Move an email to the trash.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "message_id": { "type": "string" }
                },
                "required": ["message_id"]
            }
        }),
        serde_json::json!({
            "name": "get_inbox_stats_tool",
            "description": "Get inbox statistics: total, unread, read, starred, with attachments, in inbox.",
            "inputSchema": {
                "type": "object",
                "properties": {},
                "required": []
            }
        }),
        serde_json::json!({
            "name": "count_emails_from_sender_tool",
            "description": "Count emails from a specific sender.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "sender_email": { "type": "string" }
                },
                "required": ["sender_email"]
            }
        }),
        serde_json::json!({
            "name": "count_emails_in_date_range_tool",
            "description": "Count emails received between two dates.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "start_date": { "type": "string" },
                    "end_date": { "type": "string" }
                },
                "required": ["start_date", "end_date"]
            }
        }),
        serde_json::json!({
            "name": "get_emails_with_attachments_tool",
            "description": "Get emails that have attachments. Default max_results=20.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "max_results": { "type": "integer" }
                },
                "required": []
            }
        }),
        serde_json::json!({
            "name": "get_starred_emails_tool",
            "description": "Get starred emails. Default max_results=20.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "max_results": { "type": "integer" }
                },
                "required": []
            }
        }),
        serde_json::json!({
            "name": "add_label_to_email_tool",
            "description": "Add a label (by label id, see get_email_labels_tool) to an email.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "message_id": { "type": "string" },
                    "label_id": { "type": "string" }
                },
                "required": ["message_id", "label_id"]
            }
        }),
        serde_json::json!({
            "name": "get_email_labels_tool",
            "description": "List all Gmail labels with their ids.",
            "inputSchema": {
                "type": "object",
                "properties": {},
                "required": []
            }
        }),
    ]
}

pub(crate) fn tool_definitions_json() -> Vec<serde_json::Value> {
    let mut defs = file_tool_definitions();
    defs.extend(email_tool_definitions());
    defs
}

/// Tools whose effects are visible outside the conversation.
pub(crate) fn is_mutating(name: &str) -> bool {
    matches!(
        name,
        "create_file_tool"
            | "write_file_tool"
            | "append_to_file_tool"
            | "delete_file_tool"
            | "create_folder_tool"
            | "delete_folder_tool"
            | "move_file_tool"
            | "move_folder_tool"
            | "copy_file_tool"
            | "send_email_tool"
            | "reply_to_email_tool"
            | "mark_as_read_tool"
            | "mark_as_unread_tool"
            | "delete_email_tool"
            | "add_label_to_email_tool"
    )
}
