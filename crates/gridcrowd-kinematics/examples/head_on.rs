use gridcrowd_kinematics::{SweptDisc, Vec2, integrate_position, swept_circle};

fn main() {
    let radius = 1.0;
    let dt = 0.1;
    let mut a = Vec2::new(0.0, 0.0);
    let mut b = Vec2::new(10.0, 0.5);
    let va = Vec2::new(4.0, 0.0);
    let vb = Vec2::new(-4.0, 0.0);

    println!("Two disks of radius {radius} closing head-on at {} units/s", (va - vb).length());

    for step in 0..20 {
        let next_a = integrate_position(a, va, dt).expect("dt is positive");
        let next_b = integrate_position(b, vb, dt).expect("dt is positive");

        let hit = swept_circle(
            &SweptDisc::new(a, next_a, radius).expect("radius is positive"),
            &SweptDisc::new(b, next_b, radius).expect("radius is positive"),
        );

        if hit.collides {
            let t = (step as f64 + hit.t) * dt;
            println!(
                "Contact at t = {t:.3}s: a = {}, b = {}",
                a.lerp(next_a, hit.t),
                b.lerp(next_b, hit.t)
            );
            return;
        }

        a = next_a;
        b = next_b;
    }

    println!("No contact within the simulated horizon");
}
