//! HTML for the upload form and its result views.

use base64::{Engine, engine::general_purpose::STANDARD};

use crate::operation::{Operation, split_name};

const HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Image Encryption System</title>
<style>
body{background:linear-gradient(135deg,#0f2027,#203a43,#2c5364);font-family:Segoe UI,sans-serif;display:flex;justify-content:center;align-items:center;min-height:100vh;margin:0;}
.container{background:rgba(255,255,255,0.1);padding:30px;border-radius:20px;color:white;width:600px;text-align:center;}
.upload-box{display:block;border:2px dashed #fff;padding:15px;border-radius:12px;cursor:pointer;}
input[type=file]{display:none;}
img{max-width:220px;border-radius:10px;margin-top:10px;}
button{background:#ff512f;border:none;color:white;padding:10px 15px;border-radius:12px;cursor:pointer;margin-top:10px;}
a{color:#9fd3ff;}
.error{background:rgba(255,80,80,0.3);border-radius:10px;padding:10px;margin-bottom:15px;}
</style>
<script>
function showLabel(input){document.getElementById("fileLabel").innerText=input.files[0].name;}
</script>
</head>
<body>
<div class="container">
<h2>Image Encryption System</h2>
"#;

const FORM: &str = r#"<form method="POST" action="/process" enctype="multipart/form-data">
<label class="upload-box">
<span id="fileLabel">Choose Image</span>
<input type="file" name="file" onchange="showLabel(this)" required>
</label>
<br>
<input type="password" name="password" placeholder="Enter Password" required>
<br>
<button type="submit" name="action" value="encrypt">Encrypt</button>
<button type="submit" name="action" value="decrypt">Decrypt</button>
</form>
"#;

const TAIL: &str = "</div>\n</body>\n</html>\n";

/// The bare upload form.
pub fn index_page() -> String {
    format!("{HEAD}{FORM}{TAIL}")
}

/// The form again, with a failure message above it.
pub fn error_page(message: &str) -> String {
    format!(
        "{HEAD}<div class=\"error\">{}</div>\n{FORM}{TAIL}",
        escape_html(message)
    )
}

/// The form plus a link to the result, which the browser starts
/// downloading on load. Decrypted images are also shown inline.
pub fn result_page(op: Operation, token: &str, output_name: &str, output: &[u8]) -> String {
    let url = download_url(token, output_name);
    let mut section = format!(
        "<p>{} complete: <a href=\"{url}\">{}</a></p>\n",
        match op {
            Operation::Encrypt => "Encryption",
            Operation::Decrypt => "Decryption",
        },
        escape_html(output_name),
    );

    if op == Operation::Decrypt {
        if let Some(mime) = image_mime(output_name) {
            section.push_str(&format!(
                "<h3>Decrypted Preview</h3>\n<img id=\"decryptPreview\" src=\"data:{mime};base64,{}\">\n",
                STANDARD.encode(output)
            ));
        }
    }

    format!(
        "{HEAD}{section}<script>window.onload=function(){{window.location.href=\"{url}\";}}</script>\n{FORM}{TAIL}"
    )
}

/// Percent-encoded `/download/{token}/{name}` URL. The result contains no
/// characters that need escaping inside an HTML attribute or a JS string.
pub fn download_url(token: &str, output_name: &str) -> String {
    format!(
        "/download/{}/{}",
        urlencoding::encode(token),
        urlencoding::encode(output_name)
    )
}

/// MIME type for names whose extension marks a browser-displayable image.
pub fn image_mime(name: &str) -> Option<&'static str> {
    let (_, ext) = split_name(name);
    let mime = match ext.to_ascii_lowercase().as_str() {
        ".png" => "image/png",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".gif" => "image/gif",
        ".webp" => "image/webp",
        ".bmp" => "image/bmp",
        _ => return None,
    };
    Some(mime)
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
