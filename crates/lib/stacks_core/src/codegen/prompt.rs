//! Instruction prompt shared by all providers.

/// Build the generation prompt from the user's question and retrieved snippets.
pub fn build_instruction(query: &str, code_contexts: &[String], doc_contexts: &[String]) -> String {
    let mut prompt = String::from(
        "You are an expert Clarity programmer. \
         Use the provided Clarity code examples and documentation excerpts as context to answer the user's question.\n\n",
    );

    if !code_contexts.is_empty() {
        prompt.push_str("## Code Examples:\n\n");
        for (i, ctx) in code_contexts.iter().enumerate() {
            prompt.push_str(&format!("### Code Example {}:\n```clarity\n{}\n```\n\n", i + 1, ctx));
        }
    }

    if !doc_contexts.is_empty() {
        prompt.push_str("## Documentation Excerpts:\n\n");
        for (i, doc) in doc_contexts.iter().enumerate() {
            prompt.push_str(&format!("### Doc Excerpt {}:\n```text\n{}\n```\n\n", i + 1, doc));
        }
    }

    prompt.push_str("## User Question:\n");
    prompt.push_str(query);
    prompt.push_str("\n\n");

    prompt.push_str(
        "## Instructions:\n\
         Provide a clear, working Clarity code solution based on the examples above. \
         Include a brief explanation of how the code works. \
         Format your response as:\n\n\
         **Code:**\n```clarity\n[your code here]\n```\n\n\
         **Explanation:**\n[your explanation here]\n",
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn includes_numbered_sections() {
        let prompt = build_instruction(
            "How do I mint an NFT?",
            &["(nft-mint? a u1 tx-sender)".into(), "(define-non-fungible-token a uint)".into()],
            &["SIP-009 describes NFTs.".into()],
        );
        assert!(prompt.starts_with("You are an expert Clarity programmer. Use the provided"));
        assert!(prompt.contains("### Code Example 2:\n```clarity\n(define-non-fungible-token a uint)\n```"));
        assert!(prompt.contains("### Doc Excerpt 1:\n```text\nSIP-009 describes NFTs.\n```"));
        assert!(prompt.contains("## User Question:\nHow do I mint an NFT?\n\n## Instructions:\n"));
        assert!(prompt.ends_with("**Explanation:**\n[your explanation here]\n"));
    }

    #[test]
    fn omits_empty_sections() {
        let prompt = build_instruction("hi", &[], &[]);
        assert!(!prompt.contains("## Code Examples"));
        assert!(!prompt.contains("## Documentation Excerpts"));
    }
}
