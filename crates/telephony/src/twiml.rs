//! TwiML rendering for voice webhook replies.
//!
//! Every webhook response is a small XML document of verbs. The builder here
//! keeps handlers free of string surgery: they compose verbs and call
//! [`VoiceResponse::build`], which renders the document with all text and
//! attribute values escaped.

/// Voice the provider should synthesize replies with.
pub const DEFAULT_VOICE: &str = "Polly.Joanna";

/// Speech recognition language for gathered utterances.
pub const DEFAULT_LANGUAGE: &str = "en-US";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verb {
    Say { text: String },
    Gather { action: String, speech_timeout: String, language: String, inner: Vec<Verb> },
    Redirect { url: String },
    Pause { length_secs: u32 },
    Hangup,
}

pub struct VoiceResponse {
    verbs: Vec<Verb>,
}

impl VoiceResponse {
    pub fn new() -> Self {
        Self { verbs: Vec::new() }
    }

    pub fn say(mut self, text: impl Into<String>) -> Self {
        self.verbs.push(Verb::Say { text: text.into() });
        self
    }

    /// Listen for speech and post the transcript to `action`.
    ///
    /// The closure configures the gather; verbs added inside it (usually a
    /// single `say`) play while the provider is already listening, so callers
    /// can answer over the prompt.
    pub fn gather<F>(mut self, action: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut GatherBuilder),
    {
        let mut builder = GatherBuilder::default();
        build(&mut builder);
        self.verbs.push(builder.into_verb(action.into()));
        self
    }

    pub fn redirect(mut self, url: impl Into<String>) -> Self {
        self.verbs.push(Verb::Redirect { url: url.into() });
        self
    }

    pub fn pause(mut self, length_secs: u32) -> Self {
        self.verbs.push(Verb::Pause { length_secs });
        self
    }

    pub fn hangup(mut self) -> Self {
        self.verbs.push(Verb::Hangup);
        self
    }

    pub fn build(self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>");
        for verb in &self.verbs {
            render_verb(&mut xml, verb);
        }
        xml.push_str("</Response>");
        xml
    }
}

impl Default for VoiceResponse {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
pub struct GatherBuilder {
    speech_timeout: Option<String>,
    language: Option<String>,
    inner: Vec<Verb>,
}

impl GatherBuilder {
    pub fn say(&mut self, text: impl Into<String>) -> &mut Self {
        self.inner.push(Verb::Say { text: text.into() });
        self
    }

    /// Seconds of silence that end the utterance; defaults to `auto`.
    pub fn speech_timeout(&mut self, timeout: impl Into<String>) -> &mut Self {
        self.speech_timeout = Some(timeout.into());
        self
    }

    pub fn language(&mut self, language: impl Into<String>) -> &mut Self {
        self.language = Some(language.into());
        self
    }

    fn into_verb(self, action: String) -> Verb {
        Verb::Gather {
            action,
            speech_timeout: self.speech_timeout.unwrap_or_else(|| "auto".to_string()),
            language: self.language.unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            inner: self.inner,
        }
    }
}

fn render_verb(xml: &mut String, verb: &Verb) {
    match verb {
        Verb::Say { text } => {
            xml.push_str("<Say voice=\"");
            xml.push_str(DEFAULT_VOICE);
            xml.push_str("\">");
            push_escaped(xml, text);
            xml.push_str("</Say>");
        }
        Verb::Gather { action, speech_timeout, language, inner } => {
            xml.push_str("<Gather input=\"speech\" action=\"");
            push_escaped(xml, action);
            xml.push_str("\" method=\"POST\" speechTimeout=\"");
            push_escaped(xml, speech_timeout);
            xml.push_str("\" language=\"");
            push_escaped(xml, language);
            xml.push_str("\">");
            for nested in inner {
                render_verb(xml, nested);
            }
            xml.push_str("</Gather>");
        }
        Verb::Redirect { url } => {
            xml.push_str("<Redirect method=\"POST\">");
            push_escaped(xml, url);
            xml.push_str("</Redirect>");
        }
        Verb::Pause { length_secs } => {
            xml.push_str("<Pause length=\"");
            xml.push_str(&length_secs.to_string());
            xml.push_str("\"/>");
        }
        Verb::Hangup => xml.push_str("<Hangup/>"),
    }
}

fn push_escaped(xml: &mut String, raw: &str) {
    for ch in raw.chars() {
        match ch {
            '&' => xml.push_str("&amp;"),
            '<' => xml.push_str("&lt;"),
            '>' => xml.push_str("&gt;"),
            '"' => xml.push_str("&quot;"),
            '\'' => xml.push_str("&apos;"),
            _ => xml.push(ch),
        }
    }
}

/// Speak `prompt` and listen for the caller's answer.
///
/// The trailing redirect re-posts to `action` when the gather times out with
/// no speech, so a silent caller produces another turn (with an empty
/// transcript) instead of a dropped call.
pub fn gather_turn(prompt: &str, action: &str) -> String {
    VoiceResponse::new()
        .gather(action, |gather| {
            gather.say(prompt);
        })
        .redirect(action)
        .build()
}

/// Speak a final line and end the call.
pub fn farewell(line: &str) -> String {
    VoiceResponse::new().say(line).hangup().build()
}
