//! Text templates for tool output, rendered with Handlebars. Only the
//! helpers registered here are available to templates.

use std::fmt;

use handlebars::{Handlebars, handlebars_helper};

// A simple `inc` helper for use with `each` and `@index` so that
// there can be natural number sequences when rendering (instead of
// starting at 0).
handlebars_helper!(inc: |v: i64| format!("{}", v + 1));

#[derive(Debug)]
pub enum Prompt {
    EmailDigest,
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<Prompt> for String {
    fn from(item: Prompt) -> String {
        format!("{:?}", item)
    }
}

const EMAIL_DIGEST: &str = r"
Emails retrieved from '{{folder}}' ({{count}}):

{{#each emails}}
--- Email {{inc @index}} ---
ID: {{id}}
From: {{from}}
To: {{to}}
{{#if cc}}Cc: {{cc}}
{{/if}}Subject: {{subject}}
Date: {{date}}
{{#if attachments}}Attachments: {{attachments}}
{{/if}}Body preview:
{{preview}}

{{/each}}
";

pub fn templates<'a>() -> Handlebars<'a> {
    let mut registry = Handlebars::new();
    registry.set_strict_mode(true);
    // Output is plain text for an agent, not HTML
    registry.register_escape_fn(handlebars::no_escape);
    registry.register_helper("inc", Box::new(inc));
    registry
        .register_template_string(&Prompt::EmailDigest.to_string(), EMAIL_DIGEST)
        .expect("Failed to register template");
    registry
}
