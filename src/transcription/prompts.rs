use crate::media::OutputMode;

use super::gemini::GenerationParams;

fn speaker_instructions(params: &GenerationParams) -> String {
    let mut out = format!(
        "The recording is a user-research interview with exactly {} distinct speaker(s). \
         Attribute every utterance to the person who said it and never merge different voices into one speaker.\n",
        params.speaker_count
    );
    let hint = params.interviewer_name_hint.trim();
    if hint.is_empty() {
        out.push_str(
            "Label the interviewer \"Speaker 1\" and the other participants \
             \"Speaker 2\", \"Speaker 3\" and so on.\n",
        );
    } else {
        out.push_str(&format!(
            "The interviewer is {hint}. Label the interviewer \"{hint}\" and the other participants \"Speaker 2\", \"Speaker 3\" and so on.\n"
        ));
    }
    out
}

/// Transcription prompt for the primary provider in the given output mode.
pub fn transcription_prompt(params: &GenerationParams) -> String {
    let mut prompt = String::from(
        "Transcribe this audio verbatim in its original language. Do not summarize, translate or omit anything.\n",
    );
    prompt.push_str(&speaker_instructions(params));

    match params.output_mode {
        OutputMode::Json => prompt.push_str(
            "Return a JSON array. Each element is one speaker turn: \
             {\"speaker\": label, \"timestamp\": \"MM:SS\" start time (\"HH:MM:SS\" past one hour), \"text\": what was said}. \
             Return only the JSON array.",
        ),
        OutputMode::Text => prompt.push_str(
            "Write one line per speaker turn in the form `Label [MM:SS]: text`, using HH:MM:SS past one hour. \
             Start a new line whenever the speaker changes. Output only the transcript lines.",
        ),
    }
    prompt
}
