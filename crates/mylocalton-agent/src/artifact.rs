use mylocalton_process::{Arch, Network};

pub const DEFAULT_DOWNLOAD_BASE_URL: &str =
    "https://github.com/neodix42/mylocalton/releases/latest/download/";

const ARTIFACT_NAME: &str = "MyLocalTon";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    pub arch: Arch,
    pub network: Network,
    pub filename: String,
    pub url: String,
}

pub fn artifact_filename(arch: Arch, network: Network) -> String {
    match network {
        Network::Mainnet => format!("{ARTIFACT_NAME}-{arch}.jar"),
        Network::Testnet => format!("{ARTIFACT_NAME}-{arch}-testnet.jar"),
    }
}

pub fn resolve_artifact(arch: Arch, network: Network) -> ArtifactDescriptor {
    resolve_artifact_with_base(DEFAULT_DOWNLOAD_BASE_URL, arch, network)
}

pub fn resolve_artifact_with_base(base_url: &str, arch: Arch, network: Network) -> ArtifactDescriptor {
    let filename = artifact_filename(arch, network);
    let mut url = base_url.trim().to_string();
    if !url.ends_with('/') {
        url.push('/');
    }
    url.push_str(&filename);
    ArtifactDescriptor {
        arch,
        network,
        filename,
        url,
    }
}

/// Every (arch, network) pair, host architecture first, mainnet before testnet.
pub fn candidates(host: Arch) -> Vec<(Arch, Network)> {
    let other = match host {
        Arch::X86_64 => Arch::Arm64,
        Arch::Arm64 => Arch::X86_64,
    };
    vec![
        (host, Network::Mainnet),
        (host, Network::Testnet),
        (other, Network::Mainnet),
        (other, Network::Testnet),
    ]
}
