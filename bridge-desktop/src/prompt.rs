//! Terminal credential prompt

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    prompt::{CredentialPrompt, PromptResponse},
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::info;

/// Prints the consent URL and reads the authorization code from a line of input.
///
/// An empty line (or `skip`) declines authorization for this run.
pub struct TerminalPrompt<R = BufReader<tokio::io::Stdin>, W = tokio::io::Stderr> {
    reader: Mutex<R>,
    writer: Mutex<W>,
}

impl TerminalPrompt {
    /// Prompt on stderr, read the answer from stdin
    pub fn new() -> Self {
        Self::with_io(BufReader::new(tokio::io::stdin()), tokio::io::stderr())
    }
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, W> TerminalPrompt<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn with_io(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }
}

fn parse_answer(line: &str) -> PromptResponse {
    let answer = line.trim();
    if answer.is_empty() || answer.eq_ignore_ascii_case("skip") {
        PromptResponse::Skip
    } else {
        PromptResponse::Code(answer.to_string())
    }
}

#[async_trait]
impl<R, W> CredentialPrompt for TerminalPrompt<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn request_authorization_code(
        &self,
        authorization_url: &str,
    ) -> Result<PromptResponse> {
        info!("Waiting for operator authorization");

        {
            let mut writer = self.writer.lock().await;
            let message = format!(
                "Authorize this app by visiting:\n\n  {}\n\nPaste the code here (leave empty to skip): ",
                authorization_url
            );
            writer.write_all(message.as_bytes()).await?;
            writer.flush().await?;
        }

        let mut line = String::new();
        let read = self.reader.lock().await.read_line(&mut line).await?;
        if read == 0 {
            return Err(BridgeError::NotAvailable(
                "input closed before an authorization code was entered".to_string(),
            ));
        }

        Ok(parse_answer(&line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("  4/abc \n"), PromptResponse::Code("4/abc".into()));
        assert_eq!(parse_answer("\n"), PromptResponse::Skip);
        assert_eq!(parse_answer("SKIP\n"), PromptResponse::Skip);
    }

    #[tokio::test]
    async fn test_prompt_reads_code_and_shows_url() {
        let input: &[u8] = b"code-123\n";
        let prompt = TerminalPrompt::with_io(BufReader::new(input), Vec::<u8>::new());

        let answer = prompt
            .request_authorization_code("https://accounts.example/auth")
            .await
            .unwrap();

        assert_eq!(answer, PromptResponse::Code("code-123".to_string()));
        let shown = String::from_utf8(prompt.writer.lock().await.clone()).unwrap();
        assert!(shown.contains("https://accounts.example/auth"));
    }

    #[tokio::test]
    async fn test_prompt_closed_input_is_error() {
        let input: &[u8] = b"";
        let prompt = TerminalPrompt::with_io(BufReader::new(input), Vec::<u8>::new());

        assert!(prompt.request_authorization_code("u").await.is_err());
    }
}
