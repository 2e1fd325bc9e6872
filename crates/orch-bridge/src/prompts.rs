//! Prompt text sent to the chat model

/// System prompt for browser automation sessions
pub fn browser_automation_system_prompt() -> String {
    "You are an assistant specialized in browser automation and test execution.\n\
     \n\
     Use the available tools to act; do not write automation code yourself.\n\
     - fetch_jira_story: read a Jira ticket\n\
     - playwright_navigate, playwright_click, playwright_fill, playwright_select,\n  \
       playwright_hover: drive the browser\n\
     - playwright_screenshot: capture the page\n\
     - extract_selector_by_page_content: find a CSS selector on the current page\n\
     - run_karate_test, list_karate_features, get_test_results: API tests\n\
     \n\
     Tool results arrive as JSON envelopes. When `ok` is false, read\n\
     `error.kind` and `error.message`, then decide whether to retry with\n\
     different arguments or report the failure.\n\
     \n\
     When you are done, answer with a short summary of every action taken."
        .to_string()
}

/// User turn asking the model to automate a ticket end to end
pub fn jira_automation_prompt(jira_key: &str) -> String {
    format!(
        "Automate Jira ticket {jira_key} using the tools only.\n\
         \n\
         1. Call fetch_jira_story with jira_key \"{jira_key}\".\n\
         2. Perform each step of the description with the browser tools,\n   \
            using extract_selector_by_page_content to locate elements.\n\
         3. Take a screenshot after every significant step.\n\
         4. Summarize the actions performed and anything that failed."
    )
}

/// User turn for one instruction of a ticket workflow
pub fn instruction_prompt(jira_key: &str, instruction: &str) -> String {
    format!(
        "Ticket {jira_key}, next step: {instruction}\n\
         Perform this step in the browser with the tools, then reply with one line describing the result."
    )
}
