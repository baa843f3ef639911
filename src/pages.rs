//! Static HTML served by the login flow.

pub const WELCOME_HTML: &str = r#"Welcome to Crunch.  Please <a href="/login">login</a>."#;

pub const LOGIN_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>Crunch Login</title></head>
<body>
<h1>Login</h1>
<form method="post" action="/login">
  <label>Email <input type="text" name="username"></label>
  <label>Password <input type="password" name="password"></label>
  <input type="submit" value="Login">
</form>
</body>
</html>
"#;

pub const LOGOUT_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>Crunch Logout</title></head>
<body>
<h1>Logout</h1>
<p>You are logged in. <a href="/users">Members</a> | <a href="/distances">Distances</a></p>
<form method="post" action="/logout">
  <input type="submit" value="Logout">
</form>
</body>
</html>
"#;
