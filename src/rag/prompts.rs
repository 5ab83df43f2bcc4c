//! Prompt templates and query rewriting for entity resolution.

use serde::Serialize;

/// Maps a short name users type to the full name documents use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityAlias {
    /// Lower-cased short form matched against queries.
    pub short: String,
    /// Full form appended to matching queries.
    pub full: String,
}

impl EntityAlias {
    /// Build an alias; the short form is matched case-insensitively.
    pub fn new(short: impl AsRef<str>, full: impl Into<String>) -> Self {
        Self {
            short: short.as_ref().trim().to_lowercase(),
            full: full.into().trim().to_string(),
        }
    }

    /// Parse `short=Full Name` pairs separated by `;`. Empty segments are ignored.
    pub fn parse_list(list: &str) -> Result<Vec<Self>, String> {
        list.split(';')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                let (short, full) = segment
                    .split_once('=')
                    .ok_or_else(|| format!("expected `short=Full Name`, got `{segment}`"))?;
                let alias = Self::new(short, full);
                if alias.short.is_empty() || alias.full.is_empty() {
                    return Err(format!("alias `{segment}` has an empty side"));
                }
                Ok(alias)
            })
            .collect()
    }
}

/// Append the full name of the first alias mentioned in `query`.
///
/// Aliases are tried in order and matched as case-insensitive substrings. The original query
/// text is kept so retrieval sees both spellings.
pub fn enhance_query_for_entity_resolution(query: &str, aliases: &[EntityAlias]) -> String {
    let lowered = query.to_lowercase();
    aliases
        .iter()
        .find(|alias| lowered.contains(&alias.short))
        .map(|alias| format!("{query} (also search for: {})", alias.full))
        .unwrap_or_else(|| query.to_string())
}

/// Prompt grounding the answer in numbered context chunks.
pub fn build_rag_prompt_with_sources<S: AsRef<str>>(
    context_chunks: &[S],
    user_query: &str,
) -> String {
    let numbered = context_chunks
        .iter()
        .enumerate()
        .map(|(index, chunk)| format!("[Source {}]\n{}", index + 1, chunk.as_ref()))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    format!(
        "You are a helpful assistant answering questions from the documents below. Answer \
naturally, the way you would explain something to a friend.

Context from documents:
{numbered}

User Question: {user_query}

Important Instructions:
1. **Entity Resolution**: When the question uses only part of a name, treat it as the full name \
that appears in the context and use the full name where it helps.

2. **Answer Style**:
   - Answer directly and conversationally
   - Avoid phrases such as \"Based on the context\" or \"According to Source X\"
   - Refer to people naturally, using pronouns the context supports

3. **Relevance & Conciseness**:
   - Answer exactly what is asked
   - Keep short answers short; a yes/no or one sentence is fine when it suffices
   - Leave out background that the question does not need

4. **Information Usage**:
   - Use ONLY the information in the context above
   - Merge overlapping sources into one answer
   - If the context is not enough, say so briefly
   - Never invent information that is not in the context

5. **Citations**:
   - Mention sources only when asked or when it adds clarity

6. **Clarity**:
   - For ambiguous questions, give the most relevant answer the context supports
   - For \"Who is X?\", introduce the person with their full name and key details

Answer the question naturally and concisely:"
    )
}
