//! Prompt templates
//!
//! Every model call in the pipeline is a single formatted prompt. Templates
//! live here so the call sites stay free of string plumbing.

use litreview_core::Candidate;

/// HyDE: ask for a plausible, keyword-rich answer to embed in place of the query
pub fn hypothetical_answer(query: &str) -> String {
    format!(
        "You are a helpful expert research assistant.\n\
         Provide a hypothetical answer to the following question.\n\
         Focus on containing keywords and scientific terminology that would appear in a relevant paper.\n\
         Do not say \"I don't know\". Hallucinate a plausible-sounding scientific answer.\n\
         \n\
         QUESTION: {query}\n\
         \n\
         HYPOTHETICAL ANSWER:\n"
    )
}

/// Decompose a complex question into independent sub-questions, one per line
pub fn sub_questions(query: &str) -> String {
    format!(
        "You are a helpful expert research assistant.\n\
         Break down the following complex question into 2-3 simple, independent sub-questions \
         that can be searched for in a scientific database.\n\
         \n\
         Examples:\n\
         Complex: \"Compare RAG and Fine-tuning for medical QA.\"\n\
         Sub 1: \"What is RAG in medical QA?\"\n\
         Sub 2: \"What is Fine-tuning in medical QA?\"\n\
         \n\
         Complex: \"{query}\"\n\
         \n\
         SUB-QUESTIONS (one per line):\n"
    )
}

/// Extract the sentences of `text` relevant to `query`, or the sentinel
pub fn refine(query: &str, text: &str, sentinel: &str) -> String {
    format!(
        "You are a helpful assistant.\n\
         Extract only the sentences from the following text that are directly relevant to the query: \"{query}\"\n\
         If the text contains no relevant information, output \"{sentinel}\".\n\
         \n\
         TEXT:\n\
         {text}\n\
         \n\
         RELEVANT SENTENCES:\n"
    )
}

/// Context block: `Source: <title>\nText: <text>` per chunk, blank-line separated
pub fn context_block(chunks: &[Candidate]) -> String {
    chunks
        .iter()
        .map(|c| format!("Source: {}\nText: {}", c.title().unwrap_or("Unknown"), c.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Literature review over labeled context
pub fn literature_review(query: &str, chunks: &[Candidate]) -> String {
    let context = context_block(chunks);
    format!(
        "You are an expert academic researcher assistant.\n\
         Your task is to write a literature review section based ONLY on the provided context.\n\
         \n\
         QUERY: {query}\n\
         \n\
         CONTEXT:\n\
         {context}\n\
         \n\
         INSTRUCTIONS:\n\
         1. **Analyze**: First, analyze the retrieved context and identify the key themes, methodologies, and findings.\n\
         2. **Synthesize**: Compare and contrast the different approaches.\n\
         3. **Cite**: Use [Author, Year] or [Title] for every claim.\n\
         4. **Structure**: Write a coherent IEEE-style review.\n\
         5. **Reasoning**: Think step-by-step about how the papers relate to the query before writing.\n\
         \n\
         Let's think step by step.\n\
         \n\
         LITERATURE REVIEW:\n"
    )
}

/// Judge: is the answer supported by the context?
pub fn faithfulness_judge(context: &str, answer: &str) -> String {
    format!(
        "You are an impartial judge evaluating a RAG system.\n\
         Task: Evaluate the Faithfulness of the ANSWER to the provided CONTEXT.\n\
         \n\
         CONTEXT:\n\
         {context}\n\
         \n\
         ANSWER:\n\
         {answer}\n\
         \n\
         INSTRUCTIONS:\n\
         1. Read the Context and the Answer.\n\
         2. Identify any claims in the Answer that contradict or are unsupported by the Context.\n\
         3. Think step by step.\n\
         4. Output a score from 1 to 5, where:\n   \
            - 1: Entirely hallucinated or contradicts context.\n   \
            - 3: Mostly supported but has minor unverified details.\n   \
            - 5: Fully supported by context.\n\
         \n\
         OUTPUT FORMAT:\n\
         Reasoning: [Your step-by-step reasoning]\n\
         Score: [1-5]\n"
    )
}

/// Judge: does the answer address the query?
pub fn relevance_judge(query: &str, answer: &str) -> String {
    format!(
        "You are an impartial judge evaluating a RAG system.\n\
         Task: Evaluate the Relevance of the ANSWER to the QUERY.\n\
         \n\
         QUERY:\n\
         {query}\n\
         \n\
         ANSWER:\n\
         {answer}\n\
         \n\
         INSTRUCTIONS:\n\
         1. Analyze the user Query intent.\n\
         2. Determine if the Answer directly addresses the intent.\n\
         3. Think step by step.\n\
         4. Output a score from 1 to 5, where:\n   \
            - 1: Completely irrelevant or off-topic.\n   \
            - 3: Partially relevant but misses key aspects.\n   \
            - 5: Highly relevant and comprehensive.\n\
         \n\
         OUTPUT FORMAT:\n\
         Reasoning: [Your step-by-step reasoning]\n\
         Score: [1-5]\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use litreview_core::{metadata_keys, Chunk, Metadata};

    fn candidate(title: Option<&str>, text: &str) -> Candidate {
        let mut metadata = Metadata::new();
        if let Some(t) = title {
            metadata.insert(metadata_keys::TITLE.to_string(), t.to_string());
        }
        Chunk::new("x_0", text, metadata).into()
    }

    #[test]
    fn test_hypothetical_answer_embeds_query() {
        let prompt = hypothetical_answer("RAG for medical QA");
        assert!(prompt.contains("QUESTION: RAG for medical QA\n"));
        assert!(prompt.ends_with("HYPOTHETICAL ANSWER:\n"));
    }

    #[test]
    fn test_sub_questions_prompt() {
        let prompt = sub_questions("Compare A and B");
        assert!(prompt.contains("Complex: \"Compare A and B\""));
        assert!(prompt.contains("2-3 simple, independent sub-questions that can be searched"));
        assert!(prompt.ends_with("SUB-QUESTIONS (one per line):\n"));
    }

    #[test]
    fn test_refine_prompt_names_sentinel() {
        let prompt = refine("q", "some text", "IRRELEVANT");
        assert!(prompt.contains("output \"IRRELEVANT\""));
        assert!(prompt.contains("TEXT:\nsome text\n"));
    }

    #[test]
    fn test_context_block_labels_sources() {
        let block = context_block(&[
            candidate(Some("a.pdf"), "alpha"),
            candidate(None, "beta"),
        ]);
        assert_eq!(block, "Source: a.pdf\nText: alpha\n\nSource: Unknown\nText: beta");
    }

    #[test]
    fn test_literature_review_prompt() {
        let prompt = literature_review("topic", &[candidate(Some("a.pdf"), "alpha")]);
        assert!(prompt.contains("QUERY: topic\n"));
        assert!(prompt.contains("CONTEXT:\nSource: a.pdf\nText: alpha\n"));
        assert!(prompt.contains("3. **Cite**"));
        assert!(prompt.ends_with("LITERATURE REVIEW:\n"));
    }

    #[test]
    fn test_judge_prompts_request_score_line() {
        assert!(faithfulness_judge("ctx", "ans").contains("Score: [1-5]"));
        assert!(relevance_judge("q", "ans").contains("QUERY:\nq\n"));
        assert!(faithfulness_judge("ctx", "ans").contains("   - 5: Fully supported by context.\n"));
    }
}
