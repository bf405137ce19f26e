use crate::config::{SmbProtocolVersion, WriteAccess};
use crate::options::EffectiveOptions;
use crate::platform::{Platform, PlatformInfo};
use crate::share::ShareId;

/// Builds the option string handed to the privileged mount utility.
///
/// All flag-name knowledge lives behind this trait so the orchestration
/// logic never branches on the target OS.
pub trait OptionStringBuilder: Send + Sync {
    /// The UNC-equivalent source argument for the mount utility.
    fn source(&self, share: &ShareId, options: &EffectiveOptions) -> String;

    /// The option string. Never contains the password; that travels via
    /// the helper's environment.
    fn build(&self, share: &ShareId, options: &EffectiveOptions) -> String;
}

/// mount.cifs(8) `-o` syntax.
pub struct LinuxOptionStringBuilder;

impl OptionStringBuilder for LinuxOptionStringBuilder {
    fn source(&self, share: &ShareId, _options: &EffectiveOptions) -> String {
        share.unc()
    }

    fn build(&self, _share: &ShareId, options: &EffectiveOptions) -> String {
        let mut opts = Vec::new();

        match &options.username {
            Some(username) => opts.push(format!("username={username}")),
            None => opts.push("guest".to_string()),
        }

        if !options.workgroup.is_empty() {
            opts.push(format!("domain={}", options.workgroup));
        }

        opts.push(format!("uid={}", options.uid));
        opts.push(format!("gid={}", options.gid));
        opts.push(format!("port={}", options.port));
        opts.push(format!("sec={}", options.security_mode.as_option_value()));

        if options.protocol_version != SmbProtocolVersion::Negotiate {
            opts.push(format!(
                "vers={}",
                options.protocol_version.as_option_value()
            ));
        }

        match options.write_access {
            WriteAccess::ReadWrite => opts.push("rw".to_string()),
            WriteAccess::ReadOnly => opts.push("ro".to_string()),
        }

        opts.join(",")
    }
}

/// mount_smbfs(8) flag syntax for the BSDs.
pub struct BsdOptionStringBuilder;

impl OptionStringBuilder for BsdOptionStringBuilder {
    fn source(&self, share: &ShareId, options: &EffectiveOptions) -> String {
        // mount_smbfs embeds the login in the source argument
        match &options.username {
            Some(username) => format!("//{}@{}/{}", username, share.host, share.share),
            None => share.unc(),
        }
    }

    fn build(&self, _share: &ShareId, options: &EffectiveOptions) -> String {
        let mut args = Vec::new();

        if options.username.is_none() {
            // Guest login, no password prompt
            args.push("-N".to_string());
        }

        if !options.workgroup.is_empty() {
            args.push(format!("-W {}", options.workgroup));
        }

        args.push(format!("-u {}", options.uid));
        args.push(format!("-g {}", options.gid));

        if let WriteAccess::ReadOnly = options.write_access {
            args.push("-o ro".to_string());
        }

        args.join(" ")
    }
}

/// Select the builder for the detected platform.
pub fn option_builder_for(platform_info: &PlatformInfo) -> Box<dyn OptionStringBuilder> {
    match &platform_info.platform {
        Platform::Linux(_) => Box::new(LinuxOptionStringBuilder),
        _ => Box::new(BsdOptionStringBuilder),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GlobalSettings, SecurityMode, Setting};
    use crate::options::resolve;
    use crate::share::MountOwnership;

    fn effective(share: &ShareId) -> EffectiveOptions {
        resolve(
            share,
            None,
            None,
            &GlobalSettings::default(),
            MountOwnership { uid: 1000, gid: 100 },
        )
    }

    #[test]
    fn test_linux_guest_options() {
        let share = ShareId::new("WORKGROUP", "server", "data");
        let opts = effective(&share);
        let builder = LinuxOptionStringBuilder;

        assert_eq!(builder.source(&share, &opts), "//server/data");

        let built = builder.build(&share, &opts);
        assert!(built.starts_with("guest,"));
        assert!(built.contains("domain=WORKGROUP"));
        assert!(built.contains("uid=1000"));
        assert!(built.contains("gid=100"));
        assert!(built.contains("port=445"));
        assert!(built.contains("sec=ntlmssp"));
        assert!(built.ends_with(",rw"));
        // Negotiated protocol adds no vers= option
        assert!(!built.contains("vers="));
        // The password never appears in the option string
        assert!(!built.contains("password"));
    }

    #[test]
    fn test_linux_explicit_overrides() {
        let share = ShareId::new("WORKGROUP", "server", "data").with_login("alice");
        let custom = crate::config::CustomSettings {
            port: Setting::Explicit(139),
            security_mode: Setting::Explicit(SecurityMode::Ntlmv2),
            protocol_version: Setting::Explicit(SmbProtocolVersion::ThreePointOneOne),
            write_access: Setting::Explicit(WriteAccess::ReadOnly),
            ..Default::default()
        };
        let opts = resolve(
            &share,
            None,
            Some(&custom),
            &GlobalSettings::default(),
            MountOwnership { uid: 1000, gid: 100 },
        );

        let built = LinuxOptionStringBuilder.build(&share, &opts);
        assert!(built.contains("username=alice"));
        assert!(built.contains("port=139"));
        assert!(built.contains("sec=ntlmv2"));
        assert!(built.contains("vers=3.1.1"));
        assert!(built.ends_with(",ro"));
    }

    #[test]
    fn test_bsd_source_embeds_login() {
        let share = ShareId::new("WORKGROUP", "server", "data").with_login("alice");
        let opts = effective(&share);
        let builder = BsdOptionStringBuilder;

        assert_eq!(builder.source(&share, &opts), "//alice@server/data");
        let built = builder.build(&share, &opts);
        assert!(built.contains("-W WORKGROUP"));
        assert!(built.contains("-u 1000"));
        assert!(!built.contains("-N"));
    }

    #[test]
    fn test_bsd_guest_is_no_prompt() {
        let share = ShareId::new("WORKGROUP", "server", "data");
        let opts = effective(&share);
        let built = BsdOptionStringBuilder.build(&share, &opts);
        assert!(built.contains("-N"));
    }
}
