//! Server-rendered index page.

use std::fmt::Write as _;

use super::handlers::MailboxEntry;

const NO_OTP_YET: &str = "No OTP yet";

const HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Mailboxes and OTPs</title>
    <link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.0-alpha3/dist/css/bootstrap.min.css" rel="stylesheet">
    <script src="https://code.jquery.com/jquery-3.6.0.min.js"></script>
  </head>
  <body class="container mt-5">
    <h2 class="mb-4">Create mailboxes</h2>
    <form id="create-mailbox-form">
      <div class="mb-3">
        <label for="numberOfMails" class="form-label">Number of mailboxes to create:</label>
        <input type="number" id="numberOfMails" name="numberOfMails" min="1" class="form-control" required>
      </div>
      <button type="submit" class="btn btn-primary">Create</button>
    </form>
    <button id="fetch-otp-btn" class="btn btn-success mt-3">Fetch OTPs</button>
    <button id="delete-mails-btn" class="btn btn-danger mt-3">Delete selected</button>
    <h3 class="mt-5">Mailboxes</h3>
    <ul id="email-list" class="list-group">
"#;

const TAIL: &str = r#"    </ul>
    <script>
      function selectedEmails() {
        return $('.email-checkbox:checked').map(function () {
          return $(this).data('email');
        }).get();
      }

      function postJson(url, payload) {
        return $.ajax({
          url: url,
          method: 'POST',
          contentType: 'application/json',
          data: JSON.stringify(payload),
        });
      }

      function fail(fallback) {
        return function (xhr) {
          alert((xhr.responseJSON && xhr.responseJSON.message) || fallback);
        };
      }

      $('#create-mailbox-form').on('submit', function (e) {
        e.preventDefault();
        postJson('/create-mails', { numberOfMails: $('#numberOfMails').val() })
          .done(function () { location.reload(); })
          .fail(fail('Could not create mailboxes. Please try again.'));
      });

      $('#fetch-otp-btn').on('click', function () {
        const emails = selectedEmails();
        if (emails.length === 0) {
          alert('Select at least one email to fetch OTPs.');
          return;
        }
        $.ajax({ url: '/get-otp-ajax', data: { emails: emails }, traditional: true })
          .done(function () { location.reload(); })
          .fail(fail('Could not fetch OTPs. Please try again.'));
      });

      $('#delete-mails-btn').on('click', function () {
        const emails = selectedEmails();
        if (emails.length === 0) {
          alert('Select at least one email to delete.');
          return;
        }
        postJson('/delete-mails', { emails: emails })
          .done(function () { location.reload(); })
          .fail(fail('Could not delete emails. Please try again.'));
      });

      $(document).on('change', '#select-all-checkbox', function () {
        $('.email-checkbox').prop('checked', $(this).is(':checked'));
      });
    </script>
  </body>
</html>
"#;

/// Renders the listing page.
pub(crate) fn render(entries: &[MailboxEntry]) -> String {
    let mut html = String::from(HEAD);

    if entries.is_empty() {
        html.push_str("      <li class=\"list-group-item\">No mailboxes created yet.</li>\n");
    } else {
        html.push_str(
            "      <li class=\"list-group-item\">\n        \
             <input type=\"checkbox\" id=\"select-all-checkbox\">\n        \
             <label for=\"select-all-checkbox\" class=\"ms-2 fw-bold\">Select all</label>\n      \
             </li>\n",
        );
        for (index, entry) in entries.iter().enumerate() {
            let email = escape_html(&entry.email);
            let (badge, otp) = match &entry.otp {
                Some(code) => ("success", escape_html(code)),
                None => ("secondary", NO_OTP_YET.to_string()),
            };
            let _ = write!(
                html,
                "      <li class=\"list-group-item d-flex justify-content-between align-items-start\">\n        \
                 <div class=\"ms-2\">\n          \
                 <input type=\"checkbox\" class=\"email-checkbox\" data-email=\"{email}\" id=\"email-{index}\">\n          \
                 <label for=\"email-{index}\">{email} - Password: {password}</label>\n        \
                 </div>\n        \
                 <span class=\"badge bg-{badge}\">{otp}</span>\n      \
                 </li>\n",
                password = escape_html(&entry.password),
            );
        }
    }

    html.push_str(TAIL);
    html
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
