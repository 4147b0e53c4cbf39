// Prompts for the interview judge.

pub const JUDGE_PROMPT: &str = r#"You are an interview evaluator. Analyze the following candidate transcript.
Turns with role "user" are the candidate; turns with role "agent" are the interviewer.

{transcript}

Rate the candidate from 1 to 10 on each of:
- correctness
- relevance
- completeness
- confidence
- professionalism

Then give a final recommendation: Hire, Maybe or Reject.

Return JSON with exactly this shape:
{
  "scores": {
    "correctness": <1-10>,
    "relevance": <1-10>,
    "completeness": <1-10>,
    "confidence": <1-10>,
    "professionalism": <1-10>
  },
  "recommendation": "Hire" | "Maybe" | "Reject"
}"#;
