//! Prompt assembly.
//!
//! The system prompt wraps the folder's instructions with fixed guardrails;
//! the user message is a markdown-framed digest of the file: core metadata,
//! any typed metadata section, the body (whole, clipped, or omitted), the
//! tool list, and a closing block that pins the exact original filename and
//! the extension-preservation rule. Binary bodies turn the message into a
//! parts list; the transport encodes the bytes when it talks to the model.

use crate::content::{Body, FileContent};
use crate::metadata::TypedMeta;

/// One piece of a multi-part user message. Bytes stay raw here; the
/// transport decides how to encode them on the wire.
#[derive(Debug, Clone)]
pub enum MessagePart {
    Text {
        text: String,
    },
    Image {
        bytes: Vec<u8>,
        media_type: String,
    },
    File {
        bytes: Vec<u8>,
        media_type: String,
        name: String,
    },
}

#[derive(Debug, Clone)]
pub enum UserMessage {
    Text(String),
    Parts(Vec<MessagePart>),
}

impl UserMessage {
    /// The textual portion, for logging and tests.
    pub fn text(&self) -> &str {
        match self {
            UserMessage::Text(t) => t,
            UserMessage::Parts(parts) => parts
                .iter()
                .find_map(|p| match p {
                    MessagePart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .unwrap_or(""),
        }
    }
}

/// Wrap the folder prompt with the fixed system instructions.
pub fn build_system_prompt(folder_prompt: &str) -> String {
    format!(
        "You are an automated file assistant for a watched folder.\n\
         The folder owner's instructions:\n\n{}\n\n\
         Rules that always apply:\n\
         - Never guess missing information. If you are not sure what a file is, do not rename it.\n\
         - write_file is only for creating brand-new files the instructions ask for; to rename an existing file, use rename_file.\n\
         - After any successful tool call, later calls must use the new filename that tool reported.",
        folder_prompt.trim()
    )
}

/// Assemble the user message for one file event.
pub fn build_user_message(content: &FileContent) -> UserMessage {
    let core = &content.metadata.core;
    let mut text = String::new();

    text.push_str("## File\n");
    text.push_str(&format!("- Name: {}\n", core.name));
    text.push_str(&format!("- Relative path: {}\n", core.relative_path));
    text.push_str(&format!("- Category: {}\n", core.category.label()));
    text.push_str(&format!("- Size: {}\n", format_size(core.size)));
    if let Some(mime) = &core.mime {
        text.push_str(&format!("- Mime type: {}\n", mime));
    }
    if let Some(created) = &core.created {
        text.push_str(&format!("- Created: {}\n", created));
    }
    if let Some(modified) = &core.modified {
        text.push_str(&format!("- Modified: {}\n", modified));
    }
    if let Some(hash) = &core.sha256 {
        text.push_str(&format!("- SHA-256: {}\n", hash));
    }

    if let Some(typed) = &content.metadata.typed {
        text.push('\n');
        write_typed_section(&mut text, typed);
    }

    text.push('\n');
    text.push_str("## Content\n");
    match &content.body {
        Body::FullText { text: body } => {
            text.push_str(&format!("```\n{}\n```\n", body));
        }
        Body::PartialText {
            head,
            tail,
            csv_header,
            omitted_lines,
        } => {
            if let Some(header) = csv_header {
                text.push_str(&format!("### CSV Header\n```\n{}\n```\n", header));
            }
            text.push_str(&format!("```\n{}\n", head));
            text.push_str(&format!("[... {} lines omitted ...]\n", omitted_lines));
            text.push_str(&format!("{}\n```\n", tail));
        }
        Body::FullBinary { media_type, .. } => {
            text.push_str(&format!("The file itself is attached below ({}).\n", media_type));
        }
        Body::None => {
            text.push_str(
                "The file content was omitted (too large or not natively readable); work from the metadata above.\n",
            );
        }
    }

    text.push('\n');
    text.push_str("## Available tools\n");
    for tool in &content.available_tools {
        text.push_str(&format!("- {}\n", tool));
    }

    text.push('\n');
    text.push_str("## Instructions\n");
    text.push_str(&format!(
        "Any rename must preserve the original file extension. The original filename is exactly `{}`.\n",
        core.name
    ));

    match &content.body {
        Body::FullBinary { bytes, media_type } => {
            let attachment = if media_type.starts_with("image/") {
                MessagePart::Image {
                    bytes: bytes.clone(),
                    media_type: media_type.clone(),
                }
            } else {
                MessagePart::File {
                    bytes: bytes.clone(),
                    media_type: media_type.clone(),
                    name: core.name.clone(),
                }
            };
            UserMessage::Parts(vec![MessagePart::Text { text }, attachment])
        }
        _ => UserMessage::Text(text),
    }
}

fn write_typed_section(out: &mut String, typed: &TypedMeta) {
    match typed {
        TypedMeta::Image {
            width,
            height,
            format,
        } => {
            out.push_str("### Image details\n");
            out.push_str(&format!("- Dimensions: {}x{}\n", width, height));
            if let Some(format) = format {
                out.push_str(&format!("- Format: {}\n", format));
            }
        }
        TypedMeta::Pdf {
            version,
            page_count,
            encrypted,
        } => {
            out.push_str("### PDF details\n");
            if let Some(version) = version {
                out.push_str(&format!("- Version: {}\n", version));
            }
            if let Some(pages) = page_count {
                out.push_str(&format!("- Pages: {}\n", pages));
            }
            if *encrypted {
                out.push_str("- Encrypted: yes\n");
            }
        }
        TypedMeta::Archive { entry_count } => {
            out.push_str("### Archive details\n");
            out.push_str(&format!("- Entries: {}\n", entry_count));
        }
        TypedMeta::Folder {
            file_count,
            subfolder_count,
            total_size,
            extensions,
        } => {
            out.push_str("### Folder details\n");
            out.push_str(&format!("- Files: {}\n", file_count));
            out.push_str(&format!("- Subfolders: {}\n", subfolder_count));
            out.push_str(&format!("- Total size: {}\n", format_size(*total_size)));
            if !extensions.is_empty() {
                let summary: Vec<String> = extensions
                    .iter()
                    .map(|(ext, n)| format!("{} ({})", ext, n))
                    .collect();
                out.push_str(&format!("- Extensions: {}\n", summary.join(", ")));
            }
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
