//! Fixed prompts for the two completion calls and the user-facing canned texts.
//!
//! Keeping them in one place makes it easy to tune how queries are interpreted
//! and how replies read without touching the pipeline code.

/// System prompt for turning a free-text query into an intent object.
pub const INTENT_SYSTEM_PROMPT: &str = r#"You are an intent parser for a gemstone shop. Read the customer's message (it may be in any language) and return ONLY a JSON object with exactly these four fields:
{
    "stone": string or null,      // stone name or variety, e.g. "sapphire", "spinel"
    "color": string or null,      // color word, e.g. "pink", "blue"
    "budget_max": number or null, // maximum price in USD, digits only
    "intent": "buy" | "compare" | "ask" | null
}

Use null for anything the customer did not mention. Keep stone and color short and lowercase, in the customer's own words and language: never translate them, because they are matched as substrings against catalog cells written in that language. Do not add other fields and do not wrap the JSON in prose or code fences.

Examples:
Customer: "pink spinel under $1500"
Output: {"stone": "spinel", "color": "pink", "budget_max": 1500, "intent": "buy"}

Customer: "what is the difference between ruby and red spinel?"
Output: {"stone": null, "color": "red", "budget_max": null, "intent": "compare"}

Customer: "красный камень из Бирмы"
Output: {"stone": null, "color": "красный", "budget_max": null, "intent": "ask"}

Customer: "рубин до 2000"
Output: {"stone": "рубин", "color": null, "budget_max": 2000, "intent": "buy"}
"#;

/// System prompt for summarizing the selected candidates.
pub const REPLY_SYSTEM_PROMPT: &str = "You are a concise gemstone consultant. Using only the catalog rows provided, write a short reply of 3 to 5 lines for the customer. Mention each stone once with its key benefit (color, size, origin, clarity, price). Do not repeat the same facts, do not invent stones or prices, and do not use markdown.";

/// Reply when the filter leaves nothing.
pub const NO_CANDIDATES_MESSAGE: &str =
    "No matching stones found. Try relaxing your request: a different color, another stone or a higher budget.";

/// First line of the templated listing.
pub const FALLBACK_HEADER: &str = "Here is what we have:";

/// Greeting for /start and empty messages.
pub const GREETING_MESSAGE: &str =
    "Describe the stone you are looking for, for example:\npink spinel under $1500";

pub const REFRESH_OK_MESSAGE: &str = "Catalog reloaded.";

pub const REFRESH_FAILED_MESSAGE: &str =
    "Catalog reload failed, still serving the previous catalog.";

pub fn intent_user_prompt(query: &str) -> String {
    format!("Customer: {query}\nOutput:")
}

pub fn reply_user_prompt(intent_json: &str, rows_json: &str) -> String {
    format!("Customer request (parsed): {intent_json}\n\nCatalog rows:\n{rows_json}\n\nReply:")
}
