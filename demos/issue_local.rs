use devca::{CertificateIssuer, TerminalOperator, TrustStores};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Issuing a locally-trusted certificate for my-app.test...");

    let mut issuer = CertificateIssuer::new();
    let stores = TrustStores::default();

    let bundle = issuer.issue("my-app.test", &stores, &TerminalOperator)?;
    std::fs::write("my-app.pem", &bundle.cert)?;
    std::fs::write("my-app-key.pem", &bundle.key)?;
    std::fs::write("my-app-ca.pem", &bundle.ca)?;
    println!("Certificate issued and root CA installed!");

    println!("\nIssuing a second certificate (the root CA is reused)...");
    let second = issuer.issue("my-app.test", &stores, &TerminalOperator)?;
    assert_eq!(bundle.ca, second.ca);
    println!("Second certificate issued under the same root!");

    println!("\nFiles created:");
    println!("  - my-app.pem (Server certificate)");
    println!("  - my-app-key.pem (Server private key)");
    println!("  - my-app-ca.pem (Root CA certificate)");

    Ok(())
}
