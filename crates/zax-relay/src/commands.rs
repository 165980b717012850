//! The closed set of relay commands.
//!
//! Every post-handshake request carries one of these names inside its
//! encrypted JSON body. The set is closed on both sides: the relay
//! rejects names it does not know, and the client refuses to emit them.
//! Response framing varies by command, so the expected line count lives
//! here too.

use std::fmt;

/// A relay command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    /// Number of messages pending in the mailbox.
    Count,
    /// Deposit a message into a guest's mailbox.
    Upload,
    /// Fetch pending messages.
    Download,
    /// TTL of an uploaded message by storage token.
    MessageStatus,
    /// Delete messages by nonce.
    Delete,
    /// Begin a chunked file upload.
    StartFileUpload,
    /// Upload one file chunk.
    UploadFileChunk,
    /// Download one file chunk.
    DownloadFileChunk,
    /// Status of a file by upload id.
    FileStatus,
    /// Delete a file by upload id.
    DeleteFile,
}

impl Command {
    /// Every recognized command.
    pub const ALL: [Command; 10] = [
        Command::Count,
        Command::Upload,
        Command::Download,
        Command::MessageStatus,
        Command::Delete,
        Command::StartFileUpload,
        Command::UploadFileChunk,
        Command::DownloadFileChunk,
        Command::FileStatus,
        Command::DeleteFile,
    ];

    /// The name embedded in the encrypted request body.
    pub fn wire_name(self) -> &'static str {
        match self {
            Command::Count => "count",
            Command::Upload => "upload",
            Command::Download => "download",
            Command::MessageStatus => "messageStatus",
            Command::Delete => "delete",
            Command::StartFileUpload => "startFileUpload",
            Command::UploadFileChunk => "uploadFileChunk",
            Command::DownloadFileChunk => "downloadFileChunk",
            Command::FileStatus => "fileStatus",
            Command::DeleteFile => "deleteFile",
        }
    }

    /// Parse a wire name. Unknown names (including the historical
    /// `getEntropy`) yield `None`.
    pub fn from_wire(name: &str) -> Option<Self> {
        Command::ALL.into_iter().find(|c| c.wire_name() == name)
    }

    /// Number of response lines the relay must return for this command.
    pub fn response_lines(self) -> usize {
        match self {
            // Plaintext single-line responses.
            Command::Upload | Command::MessageStatus | Command::Delete => 1,
            // Encrypted envelope plus the raw chunk ciphertext.
            Command::DownloadFileChunk => 3,
            // Encrypted envelope: nonce line + ctext line.
            _ => 2,
        }
    }

    /// Whether the response starts with an encrypted `[nonce, ctext]`
    /// pair.
    pub fn response_encrypted(self) -> bool {
        self.response_lines() >= 2
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_roundtrip() {
        for command in Command::ALL {
            assert_eq!(Command::from_wire(command.wire_name()), Some(command));
        }
    }

    #[test]
    fn test_unknown_names_rejected() {
        assert_eq!(Command::from_wire("getEntropy"), None);
        assert_eq!(Command::from_wire("COUNT"), None);
        assert_eq!(Command::from_wire(""), None);
    }

    #[test]
    fn test_response_arity_table() {
        assert_eq!(Command::Upload.response_lines(), 1);
        assert_eq!(Command::MessageStatus.response_lines(), 1);
        assert_eq!(Command::Delete.response_lines(), 1);
        assert_eq!(Command::DownloadFileChunk.response_lines(), 3);
        assert_eq!(Command::Count.response_lines(), 2);
        assert_eq!(Command::Download.response_lines(), 2);
        assert_eq!(Command::StartFileUpload.response_lines(), 2);
        assert_eq!(Command::UploadFileChunk.response_lines(), 2);
        assert_eq!(Command::FileStatus.response_lines(), 2);
        assert_eq!(Command::DeleteFile.response_lines(), 2);
    }
}
