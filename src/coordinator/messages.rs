use serde::{Deserialize, Serialize};

/// Literal control message the coordinator sends after the last audio frame
pub const EOS_MARKER: &str = "EOS";

/// First message of every request, sent by the coordinator as JSON text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub id: String,
    pub content_type: String,
}

/// Status codes understood by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum Status {
    Eos,
    Success,
    NoSpeech,
    Aborted,
    AudioCapture,
    Network,
    NotAllowed,
    ServiceNotAllowed,
    BadGrammar,
    LanguageNotSupported,
    NotAvailable,
}

impl Status {
    pub fn code(self) -> i32 {
        match self {
            Status::Eos => -1,
            Status::Success => 0,
            Status::NoSpeech => 1,
            Status::Aborted => 2,
            Status::AudioCapture => 3,
            Status::Network => 4,
            Status::NotAllowed => 5,
            Status::ServiceNotAllowed => 6,
            Status::BadGrammar => 7,
            Status::LanguageNotSupported => 8,
            Status::NotAvailable => 9,
        }
    }
}

impl From<Status> for i32 {
    fn from(status: Status) -> Self {
        status.code()
    }
}

impl TryFrom<i32> for Status {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Ok(match code {
            -1 => Status::Eos,
            0 => Status::Success,
            1 => Status::NoSpeech,
            2 => Status::Aborted,
            3 => Status::AudioCapture,
            4 => Status::Network,
            5 => Status::NotAllowed,
            6 => Status::ServiceNotAllowed,
            7 => Status::BadGrammar,
            8 => Status::LanguageNotSupported,
            9 => Status::NotAvailable,
            other => return Err(format!("unknown status code {}", other)),
        })
    }
}

/// One recognition alternative
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub transcript: String,
}

/// Recognition payload of a status event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub hypotheses: Vec<Hypothesis>,
    #[serde(rename = "final")]
    pub is_final: bool,
}

/// Event sent from the worker to the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<RecognitionResult>,
}

impl StatusEvent {
    /// Successful (partial or final) transcript
    pub fn transcript(text: impl Into<String>, is_final: bool) -> Self {
        Self {
            status: Status::Success,
            result: Some(RecognitionResult {
                hypotheses: vec![Hypothesis {
                    transcript: text.into(),
                }],
                is_final,
            }),
        }
    }

    /// Sent when a request is cancelled because the decoder went silent
    pub fn no_speech() -> Self {
        Self {
            status: Status::NoSpeech,
            result: None,
        }
    }

    /// Transcript of the first hypothesis, if any
    pub fn first_transcript(&self) -> Option<&str> {
        self.result
            .as_ref()
            .and_then(|r| r.hypotheses.first())
            .map(|h| h.transcript.as_str())
    }
}
