use crate::SlackError;

/// Extract the text layer of a PDF. Parsing is CPU-bound and runs off the async workers.
pub async fn extract_pdf_text(bytes: Vec<u8>) -> Result<String, SlackError> {
    tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|err| SlackError::Pdf(format!("parser task aborted: {err}")))?
        .map_err(|err| SlackError::Pdf(err.to_string()))
}

pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
